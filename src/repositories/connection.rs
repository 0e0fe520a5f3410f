//! Connection repository
//!
//! Connections are written with credentials parsed into their per-kind shape
//! and stored encrypted. Reads hand back the raw row; callers that need the
//! secrets go through [`ConnectionRepository::credentials`].

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::{RepositoryError, RepositoryResult};
use crate::connectors::credentials::ConnectionCredentials;
use crate::crypto::{CryptoKey, decrypt_credentials, encrypt_credentials};
use crate::models::connection::{self, ConnectionKind, Direction, Entity as Connection};
use crate::models::table_config::{self, Entity as TableConfig};

/// Fields accepted when creating a connection
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub name: String,
    pub description: Option<String>,
    pub kind: ConnectionKind,
    pub direction: Direction,
    pub credentials: Value,
}

/// Fields accepted when updating a connection; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct ConnectionChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub credentials: Option<Value>,
}

/// Repository for connection database operations
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    db: Arc<DatabaseConnection>,
    crypto_key: CryptoKey,
}

impl ConnectionRepository {
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Validates and stores a new connection with encrypted credentials
    pub async fn create(&self, input: NewConnection) -> RepositoryResult<connection::Model> {
        let name = required_name(&input.name)?;
        if input.kind.required_direction() != input.direction {
            return Err(RepositoryError::invalid(
                "direction",
                format!(
                    "{:?} connections must have direction {:?}",
                    input.kind,
                    input.kind.required_direction()
                )
                .to_lowercase(),
            ));
        }

        let credentials = ConnectionCredentials::parse(input.kind, input.credentials)?;
        let id = Uuid::new_v4();
        let ciphertext = encrypt_credentials(&self.crypto_key, id, &credentials)?;
        let now = Utc::now().fixed_offset();

        let active = connection::ActiveModel {
            id: Set(id),
            name: Set(name),
            description: Set(input.description),
            kind: Set(input.kind),
            direction: Set(input.direction),
            credentials_ciphertext: Set(ciphertext),
            created_at: Set(now),
            updated_at: Set(now),
        };
        active.insert(&*self.db).await?;

        // For SQLite, query the record directly since we already know the ID
        self.get(id).await
    }

    /// Applies changes to an existing connection; kind and direction are immutable
    pub async fn update(
        &self,
        id: Uuid,
        changes: ConnectionChanges,
    ) -> RepositoryResult<connection::Model> {
        let existing = self.get(id).await?;
        let kind = existing.kind;
        let mut model: connection::ActiveModel = existing.into();

        if let Some(name) = changes.name {
            model.name = Set(required_name(&name)?);
        }
        if let Some(description) = changes.description {
            model.description = Set(Some(description).filter(|d| !d.trim().is_empty()));
        }
        if let Some(raw) = changes.credentials {
            let credentials = ConnectionCredentials::parse(kind, raw)?;
            model.credentials_ciphertext =
                Set(encrypt_credentials(&self.crypto_key, id, &credentials)?);
        }
        model.updated_at = Set(Utc::now().fixed_offset());

        model.update(&*self.db).await?;
        self.get(id).await
    }

    pub async fn find(&self, id: Uuid) -> RepositoryResult<Option<connection::Model>> {
        Ok(Connection::find_by_id(id).one(&*self.db).await?)
    }

    pub async fn get(&self, id: Uuid) -> RepositoryResult<connection::Model> {
        self.find(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("connection", id))
    }

    /// Lists connections ordered by name
    pub async fn list(&self) -> RepositoryResult<Vec<connection::Model>> {
        Ok(Connection::find()
            .order_by_asc(connection::Column::Name)
            .order_by_asc(connection::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Decrypts the credentials stored on a connection row
    pub fn credentials(&self, model: &connection::Model) -> RepositoryResult<ConnectionCredentials> {
        decrypt_credentials(
            &self.crypto_key,
            model.id,
            model.kind,
            &model.credentials_ciphertext,
        )
        .map_err(|err| {
            tracing::error!(connection_id = %model.id, "Credential decryption failed");
            err.into()
        })
    }

    /// Deletes a connection unless a table configuration still references it
    pub async fn delete(&self, id: Uuid) -> RepositoryResult<()> {
        self.get(id).await?;

        let references = TableConfig::find()
            .filter(
                Condition::any()
                    .add(table_config::Column::SourceConnectionId.eq(id))
                    .add(table_config::Column::DestinationConnectionId.eq(id)),
            )
            .count(&*self.db)
            .await?;
        if references > 0 {
            return Err(RepositoryError::Conflict(format!(
                "connection {} is referenced by {} table configuration(s)",
                id, references
            )));
        }

        Connection::delete_by_id(id).exec(&*self.db).await?;
        Ok(())
    }
}

fn required_name(name: &str) -> RepositoryResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RepositoryError::invalid("name", "name must not be empty"));
    }
    Ok(trimmed.to_string())
}
