//! Group hierarchy flattening and application-scoped filtering.
//!
//! Keycloak returns top-level groups with their children inline. The API
//! works on a flat list: every top-level group followed by its immediate
//! children. Grandchildren are not expanded.

use crate::models::IdpGroup;

/// `true` when the group belongs to the application scope.
///
/// Case-insensitive substring match on the group path; an absent or empty
/// scope retains everything.
pub fn in_scope(group: &IdpGroup, scope: Option<&str>) -> bool {
    match scope.filter(|s| !s.is_empty()) {
        Some(scope) => group
            .path
            .to_lowercase()
            .contains(&scope.to_lowercase()),
        None => true,
    }
}

/// Keep only the groups inside `scope`, preserving order.
pub fn filter_by_scope(groups: Vec<IdpGroup>, scope: Option<&str>) -> Vec<IdpGroup> {
    groups
        .into_iter()
        .filter(|group| in_scope(group, scope))
        .collect()
}

/// Flatten one level of `subGroups`, filter to `scope` and order by level.
///
/// The sort is stable, so groups sharing a level keep their tree order.
pub fn flatten_groups(groups: Vec<IdpGroup>, scope: Option<&str>) -> Vec<IdpGroup> {
    let mut flat = Vec::with_capacity(groups.len());
    for group in groups {
        let children = group.sub_groups().to_vec();
        flat.push(group);
        flat.extend(children);
    }

    let mut flat = filter_by_scope(flat, scope);
    flat.sort_by_key(IdpGroup::level);
    flat
}

/// Path a group named `name` is expected to have inside `scope`.
pub fn expected_path(name: &str, scope: Option<&str>) -> String {
    match scope.filter(|s| !s.is_empty()) {
        Some(scope) => format!("/{}/{}", scope, name),
        None => name.to_string(),
    }
}

/// First group whose name and path both match exactly.
pub fn find_group<'a>(
    groups: &'a [IdpGroup],
    name: &str,
    scope: Option<&str>,
) -> Option<&'a IdpGroup> {
    let path = expected_path(name, scope);
    groups.iter().find(|g| g.name == name && g.path == path)
}
