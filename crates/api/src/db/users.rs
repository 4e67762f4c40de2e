//! `PostgreSQL` account storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

use merkato_core::{Cart, Email, UserId};

use super::{CartChange, PgStore, RepositoryError, UserStore, conflict_on_unique};
use crate::models::{NewUser, PayoutDetailsUpdate, User};

const USER_COLUMNS: &str = "id, name, email, is_seller, telebirr_phone, cbe_account, \
                            is_verified, cart, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    name: String,
    email: String,
    is_seller: bool,
    telebirr_phone: String,
    cbe_account: String,
    is_verified: bool,
    cart: Json<Cart>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            name: row.name,
            email,
            is_seller: row.is_seller,
            telebirr_phone: row.telebirr_phone,
            cbe_account: row.cbe_account,
            is_verified: row.is_verified,
            cart: row.cart.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LoginRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, new: NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO merkato.user (name, email, password_hash, telebirr_phone, verification_token)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.name)
        .bind(new.email.as_str())
        .bind(&new.password_hash)
        .bind(&new.telebirr_phone)
        .bind(&new.verification_token)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_on_unique("email already exists"))?;

        row.try_into()
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM merkato.user WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_login(&self, email: &Email) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, LoginRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM merkato.user WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Ok((row.user.try_into()?, row.password_hash)))
            .transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM merkato.user ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM merkato.user WHERE id = $1")
            .bind(id.as_i32())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn verify_email(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE merkato.user
             SET is_verified = TRUE, verification_token = NULL, updated_at = NOW()
             WHERE verification_token = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update_payout_details(
        &self,
        id: UserId,
        update: &PayoutDetailsUpdate,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE merkato.user
             SET telebirr_phone = COALESCE($2, telebirr_phone),
                 cbe_account = COALESCE($3, cbe_account),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id.as_i32())
        .bind(update.telebirr_phone.as_deref())
        .bind(update.cbe_account.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn set_seller(
        &self,
        id: UserId,
        is_seller: bool,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE merkato.user SET is_seller = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id.as_i32())
        .bind(is_seller)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update_cart(&self, id: UserId, change: CartChange) -> Result<Cart, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (Json(mut cart),): (Json<Cart>,) =
            sqlx::query_as("SELECT cart FROM merkato.user WHERE id = $1 FOR UPDATE")
                .bind(id.as_i32())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        change.apply(&mut cart)?;

        sqlx::query("UPDATE merkato.user SET cart = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_i32())
            .bind(Json(&cart))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(cart)
    }
}
