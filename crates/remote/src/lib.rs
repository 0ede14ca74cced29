pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod identity;
mod key;
pub mod objects;
pub mod query;
pub mod table;

pub use crate::identity::{Auth, Identity, IdentityAdmin};
pub use crate::key::validate as validate_key;
pub use crate::objects::ObjectStore;
pub use crate::table::TableClient;
use std::sync::Arc;

pub type TableHandle = Arc<dyn TableClient + Send + Sync>;
pub type AuthHandle = Arc<dyn Auth + Send + Sync>;
pub type IdentityAdminHandle = Arc<dyn IdentityAdmin + Send + Sync>;
pub type ObjectHandle = Arc<dyn ObjectStore + Send + Sync>;
