//! Directory queries and group-membership management.
//!
//! Combines identity-provider reads with the group flattener to answer
//! "which users are in which groups" for an optional application scope, and
//! fronts the local user record store.

use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::StatusCode;
use std::collections::HashSet;
use std::sync::Arc;

use super::groups::{filter_by_scope, find_group, flatten_groups};
use super::idp::IdentityProvider;
use super::repository::UserRepository;
use super::ServiceError;
use crate::models::{
    DirectoryUser, GroupSummary, IdpGroup, LocalUser, LocalUserChanges, NewLocalUser,
};

/// Upper bound on in-flight group-member requests while listing users.
pub const MEMBER_FETCH_CONCURRENCY: usize = 16;

#[derive(Clone, Copy)]
enum Membership {
    Add,
    Remove,
}

#[derive(Clone)]
pub struct DirectoryService {
    idp: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserRepository>,
}

impl DirectoryService {
    pub fn new(idp: Arc<dyn IdentityProvider>, users: Arc<dyn UserRepository>) -> Self {
        Self { idp, users }
    }

    /// Every provider user with their in-scope group memberships.
    ///
    /// With a scope, users that belong to none of the scoped groups are left out.
    pub async fn get_all_users(
        &self,
        scope: Option<&str>,
    ) -> Result<Vec<DirectoryUser>, ServiceError> {
        let scope = scope.filter(|s| !s.is_empty());

        let users = self.idp.list_users().await?;
        let groups = flatten_groups(self.idp.list_groups(false).await?, scope);

        let member_fetches: Vec<_> = groups
            .iter()
            .map(|group| self.member_ids(&group.id))
            .collect();
        let members: Vec<HashSet<String>> = stream::iter(member_fetches)
            .buffered(MEMBER_FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        let directory: Vec<DirectoryUser> = users
            .into_iter()
            .filter_map(|user| {
                let user_groups: Vec<GroupSummary> = groups
                    .iter()
                    .zip(&members)
                    .filter(|(_, ids)| ids.contains(&user.id))
                    .map(|(group, _)| GroupSummary::from(group))
                    .collect();

                if scope.is_some() && user_groups.is_empty() {
                    None
                } else {
                    Some(DirectoryUser::with_groups(user, user_groups))
                }
            })
            .collect();

        tracing::debug!(
            users = directory.len(),
            groups = groups.len(),
            scope = ?scope,
            "Directory assembled"
        );
        Ok(directory)
    }

    async fn member_ids(&self, group_id: &str) -> Result<HashSet<String>, ServiceError> {
        let members = self.idp.list_group_members(group_id).await?;
        Ok(members.into_iter().map(|m| m.id).collect())
    }

    /// One provider user with their direct groups, filtered to `scope`.
    pub async fn get_user_by_id(
        &self,
        user_id: &str,
        scope: Option<&str>,
    ) -> Result<DirectoryUser, ServiceError> {
        let user = self
            .idp
            .get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))?;

        let groups = filter_by_scope(self.idp.list_user_groups(user_id).await?, scope);
        let groups = groups.iter().map(GroupSummary::from).collect();

        Ok(DirectoryUser::with_groups(user, groups))
    }

    /// Add `username` to the group named `group_name` inside `app_name`.
    pub async fn update_user_group(
        &self,
        username: &str,
        group_name: &str,
        app_name: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.change_membership(Membership::Add, username, group_name, app_name)
            .await
    }

    /// Remove `username` from the group named `group_name` inside `app_name`.
    pub async fn remove_user_group(
        &self,
        username: &str,
        group_name: &str,
        app_name: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.change_membership(Membership::Remove, username, group_name, app_name)
            .await
    }

    async fn change_membership(
        &self,
        membership: Membership,
        username: &str,
        group_name: &str,
        app_name: Option<&str>,
    ) -> Result<(), ServiceError> {
        // group first: an unknown group must not touch the provider's users
        let groups = flatten_groups(self.idp.list_groups(false).await?, None);
        let group = find_group(&groups, group_name, app_name).ok_or_else(|| {
            tracing::warn!(group_name = %group_name, app_name = ?app_name, "Group not found");
            ServiceError::business("Group not found")
        })?;

        let user = self.idp.find_user_by_username(username).await?;

        let status = match membership {
            Membership::Add => self.idp.set_user_group(&user.id, &group.id).await?,
            Membership::Remove => self.idp.remove_user_group(&user.id, &group.id).await?,
        };

        if status != StatusCode::NO_CONTENT {
            tracing::error!(
                username = %username,
                group_id = %group.id,
                status = %status,
                "Unexpected status from membership update"
            );
            return Err(ServiceError::business("Update failed"));
        }

        tracing::info!(username = %username, group = %group.path, "Group membership updated");
        Ok(())
    }

    /// The user's direct groups, unflattened and unfiltered.
    pub async fn get_groups_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Vec<IdpGroup>, ServiceError> {
        Ok(self.idp.list_user_groups(user_id).await?)
    }

    /// Flattened group list, filtered to `scope` and ordered by level.
    pub async fn get_groups(&self, scope: Option<&str>) -> Result<Vec<IdpGroup>, ServiceError> {
        Ok(flatten_groups(self.idp.list_groups(false).await?, scope))
    }

    pub async fn create_user(&self, user: NewLocalUser) -> Result<LocalUser, ServiceError> {
        self.users.create(user).await
    }

    pub async fn get_local_user(&self, id: i64) -> Result<Option<LocalUser>, ServiceError> {
        self.users.find_by_id(id).await
    }

    pub async fn update_user(
        &self,
        id: i64,
        changes: LocalUserChanges,
    ) -> Result<Option<LocalUser>, ServiceError> {
        self.users.update(id, changes).await
    }

    /// Delete a local record, returning what was deleted.
    ///
    /// `None` when the record does not exist (no delete is issued) or was
    /// removed concurrently before the delete landed.
    pub async fn delete_user(&self, id: i64) -> Result<Option<LocalUser>, ServiceError> {
        let Some(user) = self.users.find_by_id(id).await? else {
            return Ok(None);
        };

        if !self.users.delete(id).await? {
            tracing::warn!(user_id = id, "Local user vanished before delete");
            return Ok(None);
        }
        tracing::info!(user_id = id, username = %user.username, "Local user deleted");
        Ok(Some(user))
    }

    /// Readiness of the local store.
    pub async fn store_health(&self) -> Result<(), ServiceError> {
        self.users.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IdpUser;
    use crate::services::idp::IdpError;
    use crate::services::repository::InMemoryUserRepository;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeIdp {
        users: Vec<IdpUser>,
        groups: Vec<IdpGroup>,
        user_groups: HashMap<String, Vec<IdpGroup>>,
        members: HashMap<String, Vec<IdpUser>>,
        failing_group: Option<String>,
        put_status: Option<StatusCode>,
        writes: Mutex<Vec<(String, String, String)>>,
        username_lookups: AtomicUsize,
        members_in_flight: AtomicUsize,
        members_peak: AtomicUsize,
    }

    impl FakeIdp {
        fn writes(&self) -> Vec<(String, String, String)> {
            self.writes.lock().unwrap().clone()
        }

        fn record(&self, verb: &str, user_id: &str, group_id: &str) -> StatusCode {
            self.writes
                .lock()
                .unwrap()
                .push((verb.into(), user_id.into(), group_id.into()));
            self.put_status.unwrap_or(StatusCode::NO_CONTENT)
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeIdp {
        async fn list_users(&self) -> Result<Vec<IdpUser>, IdpError> {
            Ok(self.users.clone())
        }

        async fn find_user_by_username(&self, username: &str) -> Result<IdpUser, IdpError> {
            self.username_lookups.fetch_add(1, Ordering::SeqCst);
            self.users
                .iter()
                .find(|u| u.username == username)
                .cloned()
                .ok_or_else(|| IdpError::NotFound(format!("{} not found", username)))
        }

        async fn get_user(&self, user_id: &str) -> Result<Option<IdpUser>, IdpError> {
            Ok(self.users.iter().find(|u| u.id == user_id).cloned())
        }

        async fn list_groups(&self, _brief: bool) -> Result<Vec<IdpGroup>, IdpError> {
            Ok(self.groups.clone())
        }

        async fn list_user_groups(&self, user_id: &str) -> Result<Vec<IdpGroup>, IdpError> {
            Ok(self.user_groups.get(user_id).cloned().unwrap_or_default())
        }

        async fn list_group_members(&self, group_id: &str) -> Result<Vec<IdpUser>, IdpError> {
            if self.failing_group.as_deref() == Some(group_id) {
                return Err(IdpError::Upstream {
                    status: 500,
                    body: "boom".into(),
                });
            }
            let now = self.members_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.members_peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.members_in_flight.fetch_sub(1, Ordering::SeqCst);

            Ok(self.members.get(group_id).cloned().unwrap_or_default())
        }

        async fn list_subgroups(&self, _group_id: &str) -> Result<Vec<IdpGroup>, IdpError> {
            Ok(vec![])
        }

        async fn set_user_group(
            &self,
            user_id: &str,
            group_id: &str,
        ) -> Result<StatusCode, IdpError> {
            Ok(self.record("PUT", user_id, group_id))
        }

        async fn remove_user_group(
            &self,
            user_id: &str,
            group_id: &str,
        ) -> Result<StatusCode, IdpError> {
            Ok(self.record("DELETE", user_id, group_id))
        }
    }

    /// Local store that counts deletes and can lose the record just before
    /// the delete lands.
    #[derive(Default)]
    struct RecordingRepository {
        inner: InMemoryUserRepository,
        deletes: AtomicUsize,
        lose_race: bool,
    }

    #[async_trait]
    impl UserRepository for RecordingRepository {
        async fn create(&self, user: NewLocalUser) -> Result<LocalUser, ServiceError> {
            self.inner.create(user).await
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<LocalUser>, ServiceError> {
            self.inner.find_by_id(id).await
        }

        async fn update(
            &self,
            id: i64,
            changes: LocalUserChanges,
        ) -> Result<Option<LocalUser>, ServiceError> {
            self.inner.update(id, changes).await
        }

        async fn delete(&self, id: i64) -> Result<bool, ServiceError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.lose_race {
                self.inner.delete(id).await?;
                return Ok(false);
            }
            self.inner.delete(id).await
        }
    }

    fn user(id: &str, username: &str) -> IdpUser {
        serde_json::from_value(json!({ "id": id, "username": username })).unwrap()
    }

    fn app_groups() -> Vec<IdpGroup> {
        serde_json::from_value(json!([
            {
                "id": "g1", "name": "admin", "path": "/app/admin",
                "attributes": { "level": ["1"] },
                "subGroups": [{ "id": "g2", "name": "viewer", "path": "/app/admin/viewer" }]
            },
            { "id": "g3", "name": "staff", "path": "/other/staff" }
        ]))
        .unwrap()
    }

    fn fake() -> FakeIdp {
        let mut members = HashMap::new();
        members.insert("g1".to_string(), vec![user("u1", "alice")]);
        members.insert("g2".to_string(), vec![user("u1", "alice"), user("u2", "bob")]);
        members.insert("g3".to_string(), vec![user("u3", "carol")]);

        FakeIdp {
            users: vec![user("u1", "alice"), user("u2", "bob"), user("u3", "carol")],
            groups: app_groups(),
            members,
            ..Default::default()
        }
    }

    fn service(idp: Arc<FakeIdp>) -> DirectoryService {
        DirectoryService::new(idp, Arc::new(InMemoryUserRepository::new()))
    }

    fn group_ids(user: &DirectoryUser) -> Vec<&str> {
        user.groups.iter().map(|g| g.id.as_str()).collect()
    }

    #[tokio::test]
    async fn scoped_listing_drops_users_without_scoped_groups() {
        let svc = service(Arc::new(fake()));

        let users = svc.get_all_users(Some("app")).await.unwrap();

        let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        // g2 has no level, so it sorts ahead of g1
        assert_eq!(group_ids(&users[0]), vec!["g2", "g1"]);
        assert_eq!(group_ids(&users[1]), vec!["g2"]);
    }

    #[tokio::test]
    async fn unscoped_listing_keeps_every_user() {
        let mut idp = fake();
        idp.users.push(user("u4", "dave"));
        let svc = service(Arc::new(idp));

        let users = svc.get_all_users(None).await.unwrap();

        assert_eq!(users.len(), 4);
        assert_eq!(group_ids(&users[2]), vec!["g3"]);
        assert!(users[3].groups.is_empty());
    }

    #[tokio::test]
    async fn failing_membership_fetch_fails_listing() {
        let mut idp = fake();
        idp.failing_group = Some("g2".into());
        let svc = service(Arc::new(idp));

        let err = svc.get_all_users(None).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::IdentityProvider(IdpError::Upstream { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn single_user_groups_are_scoped() {
        let mut idp = fake();
        let groups: Vec<IdpGroup> = serde_json::from_value(json!([
            { "id": "g1", "name": "admin", "path": "/app/admin" },
            { "id": "g3", "name": "staff", "path": "/other/staff" }
        ]))
        .unwrap();
        idp.user_groups.insert("u1".into(), groups);
        let svc = service(Arc::new(idp));

        let scoped = svc.get_user_by_id("u1", Some("app")).await.unwrap();
        assert_eq!(group_ids(&scoped), vec!["g1"]);

        let all = svc.get_user_by_id("u1", None).await.unwrap();
        assert_eq!(all.groups.len(), 2);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let svc = service(Arc::new(fake()));
        let err = svc.get_user_by_id("missing", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_user_group_puts_resolved_ids() {
        let idp = Arc::new(fake());
        let svc = service(idp.clone());

        svc.update_user_group("bob", "admin", Some("app")).await.unwrap();

        assert_eq!(
            idp.writes(),
            vec![("PUT".to_string(), "u2".to_string(), "g1".to_string())]
        );
    }

    #[tokio::test]
    async fn unresolved_group_issues_no_write() {
        let idp = Arc::new(fake());
        let svc = service(idp.clone());

        let err = svc
            .update_user_group("bob", "admin", Some("nope"))
            .await
            .unwrap_err();

        match err {
            ServiceError::Business { message, status } => {
                assert_eq!(message, "Group not found");
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(idp.writes().is_empty());
        assert_eq!(idp.username_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_204_success_is_update_failed() {
        let mut idp = fake();
        idp.put_status = Some(StatusCode::OK);
        let svc = service(Arc::new(idp));

        let err = svc
            .update_user_group("bob", "admin", Some("app"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Business { ref message, .. } if message == "Update failed"));
    }

    #[tokio::test]
    async fn remove_user_group_deletes_membership() {
        let idp = Arc::new(fake());
        let svc = service(idp.clone());

        svc.remove_user_group("alice", "staff", Some("other"))
            .await
            .unwrap();

        assert_eq!(
            idp.writes(),
            vec![("DELETE".to_string(), "u1".to_string(), "g3".to_string())]
        );
    }

    #[tokio::test]
    async fn groups_listing_is_flattened_and_scoped() {
        let svc = service(Arc::new(fake()));

        let groups = svc.get_groups(Some("app")).await.unwrap();
        let ids: Vec<&str> = groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["g2", "g1"]);
    }

    #[tokio::test]
    async fn delete_missing_local_user_issues_no_delete() {
        let repo = Arc::new(RecordingRepository::default());
        let svc = DirectoryService::new(Arc::new(fake()), repo.clone());

        assert!(svc.delete_user(7).await.unwrap().is_none());
        assert_eq!(repo.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn record_removed_before_delete_is_not_reported_deleted() {
        let repo = Arc::new(RecordingRepository {
            lose_race: true,
            ..Default::default()
        });
        let svc = DirectoryService::new(Arc::new(fake()), repo.clone());
        let created = svc
            .create_user(NewLocalUser {
                username: "jdoe".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(svc.delete_user(created.id).await.unwrap().is_none());
        assert_eq!(repo.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn member_fetches_are_capped_and_keep_group_order() {
        let group_count = MEMBER_FETCH_CONCURRENCY * 3;
        let groups: Vec<IdpGroup> = (0..group_count)
            .map(|i| {
                serde_json::from_value(json!({
                    "id": format!("g{:02}", i),
                    "name": format!("g{:02}", i),
                    "path": format!("/app/g{:02}", i)
                }))
                .unwrap()
            })
            .collect();
        let members = groups
            .iter()
            .map(|g| (g.id.clone(), vec![user("u1", "alice")]))
            .collect();
        let idp = Arc::new(FakeIdp {
            users: vec![user("u1", "alice")],
            groups: groups.clone(),
            members,
            ..Default::default()
        });
        let svc = service(idp.clone());

        let users = svc.get_all_users(None).await.unwrap();

        let expected: Vec<&str> = groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(group_ids(&users[0]), expected);
        let peak = idp.members_peak.load(Ordering::SeqCst);
        assert!(peak > 1, "member fetches ran sequentially");
        assert!(peak <= MEMBER_FETCH_CONCURRENCY, "peak in-flight fetches: {}", peak);
    }

    #[tokio::test]
    async fn delete_returns_deleted_snapshot() {
        let svc = service(Arc::new(fake()));
        let created = svc
            .create_user(NewLocalUser {
                username: "jdoe".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let deleted = svc.delete_user(created.id).await.unwrap().unwrap();
        assert_eq!(deleted, created);
        assert!(svc.get_local_user(created.id).await.unwrap().is_none());
    }
}
