use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::services::notify::{Contact, ContactBook};
use crate::services::store::StoreError;

/// Reads applicant contact details maintained by the account service.
pub struct PgContactBook {
    pool: PgPool,
}

impl PgContactBook {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactBook for PgContactBook {
    async fn contact(&self, user_id: &str) -> Result<Option<Contact>, StoreError> {
        let row = sqlx::query(
            "SELECT email, telegram_chat_id FROM applicant_contacts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<Contact, StoreError> {
            Ok(Contact {
                email: r.try_get("email")?,
                telegram_chat_id: r.try_get("telegram_chat_id")?,
            })
        })
        .transpose()
    }
}
