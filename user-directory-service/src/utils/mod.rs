pub mod path;
pub mod validation;

pub use path::ApiPath;
pub use validation::ValidatedJson;
