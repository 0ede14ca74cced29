//! Users are identities managed by the identity provider, plus a role row
//! kept in `user_roles`.

use crate::api::{execute, fetch_many, fetch_one, fetch_optional};
use crate::error::{ErrorKind, Result, partial};
use crate::models::{Role, User, UserRole, UserUpdate, from_row, from_rows, to_row};
use exn::OptionExt;
use serde_json::{Map, Value};
use sitenav_remote::identity::IdentityUpdate;
use sitenav_remote::objects::UploadOptions;
use sitenav_remote::query::{Projection, Query};
use sitenav_remote::{Identity, IdentityAdminHandle, ObjectHandle, TableHandle};
use std::collections::HashMap;
use time::OffsetDateTime;
use tracing::{debug, instrument};

const ROLES: &str = "user_roles";
const AVATAR_CACHE_CONTROL: &str = "3600";

#[derive(Clone)]
pub struct UserRoles {
    tables: TableHandle,
    privileged: TableHandle,
}

impl UserRoles {
    pub fn new(tables: TableHandle, privileged: TableHandle) -> Self {
        Self { tables, privileged }
    }

    /// The same accessor with every request sent through the privileged
    /// client.
    pub fn elevated(&self) -> Self {
        Self { tables: self.privileged.clone(), privileged: self.privileged.clone() }
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get(&self, id: &str) -> Result<Option<UserRole>> {
        let query = Query::select(ROLES, Projection::all()).eq("id", id).maybe_single();
        fetch_optional(&*self.tables, query).await?.map(from_row).transpose()
    }

    /// Every user's role.
    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn get_all(&self) -> Result<HashMap<String, Role>> {
        let rows = fetch_many(&*self.tables, Query::select(ROLES, Projection::columns(["id", "role"]))).await?;
        let roles: Vec<UserRole> = from_rows(rows)?;
        Ok(roles.into_iter().map(|row| (row.id, row.role)).collect())
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn insert(&self, id: &str, role: Role) -> Result<UserRole> {
        let row = to_row(&UserRole { id: id.to_string(), role, updated_at: None })?;
        let query = Query::insert(ROLES, [row]).returning(Projection::all()).single();
        from_row(fetch_one(&*self.tables, query, || format!("role of {id}")).await?)
    }

    /// Set the role, stamping `updated_at`.
    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn upsert(&self, id: &str, role: Role) -> Result<UserRole> {
        let row = to_row(&UserRole { id: id.to_string(), role, updated_at: Some(OffsetDateTime::now_utc()) })?;
        let query = Query::upsert(ROLES, [row], ["id"]).returning(Projection::all()).single();
        from_row(fetch_one(&*self.tables, query, || format!("role of {id}")).await?)
    }

    #[instrument(skip(self), fields(client = self.tables.name()))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        execute(&*self.tables, Query::delete(ROLES).eq("id", id)).await
    }

    /// Number of role rows, counted with the privileged client since
    /// row-level security hides other users' rows.
    #[instrument(skip(self), fields(client = self.privileged.name()))]
    pub async fn count(&self) -> Result<u64> {
        let query = Query::select(ROLES, Projection::columns(["id"])).count_only();
        let response = self.privileged.execute(query).await.map_err(ErrorKind::remote)?;
        Ok(response.count.unwrap_or_default())
    }
}

/// User administration. Requires the privileged identity client.
#[derive(Clone)]
pub struct Users {
    identities: IdentityAdminHandle,
    roles: UserRoles,
    avatars: ObjectHandle,
}

impl Users {
    pub fn new(identities: IdentityAdminHandle, roles: UserRoles, avatars: ObjectHandle) -> Self {
        Self { identities, roles, avatars }
    }

    async fn find_identity(&self, id: &str) -> Result<Identity> {
        let identities = self.identities.list_users().await.map_err(ErrorKind::remote)?;
        identities
            .into_iter()
            .find(|identity| identity.id == id)
            .ok_or_raise(|| ErrorKind::UserNotFound(id.to_string()))
    }

    async fn update_metadata(&self, id: &str, metadata: Map<String, Value>) -> Result<Identity> {
        let update = IdentityUpdate { user_metadata: Some(metadata), ..Default::default() };
        self.identities.update_user_by_id(id, update).await.map_err(ErrorKind::remote)
    }

    /// Every identity with its role. Identities without a role row are
    /// listed as [`Role::User`].
    #[instrument(skip(self))]
    pub async fn get_users(&self) -> Result<Vec<User>> {
        let (identities, roles) = futures::try_join!(
            async { self.identities.list_users().await.map_err(ErrorKind::remote) },
            self.roles.get_all(),
        )?;
        let now = OffsetDateTime::now_utc();
        Ok(identities
            .iter()
            .map(|identity| User::from_identity(identity, roles.get(&identity.id).copied(), now))
            .collect())
    }

    /// Apply `update` to the identity, then to the role row.
    ///
    /// An email already used by another identity is refused before anything
    /// changes. A failed role write after the identity was updated is a
    /// [`PartialFailure`](ErrorKind::PartialFailure).
    #[instrument(skip(self, update))]
    pub async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<User> {
        const OPERATION: &str = "update_user";
        if let Some(email) = &update.email {
            let identities = self.identities.list_users().await.map_err(ErrorKind::remote)?;
            if identities.iter().any(|other| other.id != id && other.email.as_deref() == Some(email.as_str())) {
                exn::bail!(ErrorKind::EmailTaken(email.clone()));
            }
        }

        let identity_update = IdentityUpdate {
            email: update.email.clone(),
            password: update.password.clone().filter(|password| !password.is_empty()),
            user_metadata: update.username.as_ref().map(|username| {
                let mut metadata = Map::new();
                metadata.insert("username".to_string(), Value::String(username.clone()));
                metadata
            }),
        };
        let identity = self.identities.update_user_by_id(id, identity_update).await.map_err(ErrorKind::remote)?;

        let role = match update.role {
            Some(role) => self.roles.upsert(id, role).await.map_err(|err| partial(err, OPERATION, 1))?.role,
            None => self.roles.get(id).await?.map(|row| row.role).unwrap_or_default(),
        };
        Ok(User::from_identity(&identity, Some(role), OffsetDateTime::now_utc()))
    }

    /// Remove the role row, then the identity. Not rolled back: when the
    /// identity can't be deleted the user is left without a role row.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: &str) -> Result<()> {
        self.roles.delete(id).await?;
        self.identities
            .delete_user(id)
            .await
            .map_err(|err| partial(ErrorKind::remote(err), "delete_user", 1))
    }

    /// Store a new avatar and point the user's metadata at it. Returns the
    /// public URL.
    ///
    /// The object key is `{user_id}-{unix_millis}.{extension}`. The previous
    /// avatar object is not removed.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn upload_avatar(&self, user_id: &str, file_name: &str, data: Vec<u8>) -> Result<String> {
        let identity = self.find_identity(user_id).await?;
        let extension = file_name.rsplit('.').next().unwrap_or(file_name);
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let key = format!("{}-{millis}.{extension}", identity.id);

        let options = UploadOptions {
            cache_control: Some(AVATAR_CACHE_CONTROL.to_string()),
            content_type: None,
            upsert: true,
        };
        self.avatars.upload(&key, data, &options).await.map_err(ErrorKind::remote)?;
        let url = self.avatars.public_url(&key).map_err(|err| partial(ErrorKind::remote(err), "upload_avatar", 1))?;
        debug!(%key, %url, "avatar uploaded");

        let mut metadata = Map::new();
        metadata.insert("avatar_url".to_string(), Value::String(url.clone()));
        self.update_metadata(&identity.id, metadata).await.map_err(|err| partial(err, "upload_avatar", 1))?;
        Ok(url)
    }

    /// Remove the avatar object (if the user has one) and clear the avatar
    /// URL, leaving the rest of the metadata alone.
    #[instrument(skip(self))]
    pub async fn delete_avatar(&self, user_id: &str) -> Result<()> {
        let identity = self.find_identity(user_id).await?;
        let mut completed = 0;
        if let Some(url) = identity.metadata_str("avatar_url") {
            let key = url.rsplit('/').next().unwrap_or(url).to_string();
            self.avatars.remove(&[key]).await.map_err(ErrorKind::remote)?;
            completed += 1;
        }

        let mut metadata = identity.user_metadata.clone();
        metadata.insert("avatar_url".to_string(), Value::Null);
        self.update_metadata(&identity.id, metadata).await.map_err(|err| partial(err, "delete_avatar", completed))?;
        Ok(())
    }
}
