use sqlx::PgPool;

use crate::error::AppResult;

use super::models::{PlanAudience, SubscriptionPlan};

/// key: billing-plan-catalog -> seeded read side
///
/// Plans are seeded by migration and rarely change; there is no write surface
/// here beyond what migrations apply.
#[derive(Clone)]
pub struct PlanCatalog {
    pool: PgPool,
}

impl PlanCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_active(
        &self,
        audience: Option<PlanAudience>,
    ) -> AppResult<Vec<SubscriptionPlan>> {
        let plans = match audience {
            Some(audience) => {
                sqlx::query_as::<_, SubscriptionPlan>(
                    r#"
                    SELECT * FROM billing_plans
                    WHERE active = TRUE AND audience = $1
                    ORDER BY amount_cents ASC
                    "#,
                )
                .bind(audience.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, SubscriptionPlan>(
                    "SELECT * FROM billing_plans WHERE active = TRUE ORDER BY audience, amount_cents ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(plans)
    }

    pub async fn by_code(&self, code: &str) -> AppResult<Option<SubscriptionPlan>> {
        let plan =
            sqlx::query_as::<_, SubscriptionPlan>("SELECT * FROM billing_plans WHERE code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
        Ok(plan)
    }
}
