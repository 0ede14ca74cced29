//! Typed records and their conversion to and from remote rows.

mod category;
mod friend_link;
mod order;
mod site;
mod tag;
mod user;
mod visit;

pub use self::category::{Category, CategoryPatch, CategoryStatus, NewCategory};
pub use self::friend_link::{FriendLink, FriendLinkPatch, NewFriendLink};
pub use self::order::{CategorySiteOrder, OrderWithCategory, OrderWithSite};
pub use self::site::{NewSite, OrderedSite, Site, SiteDetail, SitePatch, SiteStatus, SiteWithTags};
pub use self::tag::{Tag, TagPatch};
pub use self::user::{Role, User, UserRole, UserStatus, UserUpdate};
pub use self::visit::Visit;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sitenav_remote::query::{Row, Value};

/// Primary key of the integer-keyed tables.
pub type Id = i64;
/// Primary key of identities (and their role rows).
pub type UserId = String;

pub(crate) fn to_row<T: Serialize + ?Sized>(record: &T) -> Result<Row> {
    match serde_json::to_value(record).or_raise(|| ErrorKind::InvalidData("unserializable record".to_string()))? {
        Value::Object(row) => Ok(row),
        _ => exn::bail!(ErrorKind::InvalidData("record is not an object".to_string())),
    }
}

pub(crate) fn from_row<T: DeserializeOwned>(row: Row) -> Result<T> {
    serde_json::from_value(Value::Object(row))
        .or_raise(|| ErrorKind::InvalidData(format!("unexpected row shape for {}", std::any::type_name::<T>())))
}

pub(crate) fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter().map(from_row).collect()
}

/// `Option<Option<T>>` patch fields: absent leaves the column alone, `null`
/// clears it.
pub(crate) mod nullable {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
