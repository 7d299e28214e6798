//! 商户积分配置仓储

use async_trait::async_trait;
use chrono_tz::Tz;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::traits::MerchantSettingsRepositoryTrait;
use crate::error::{Result, RewardsError};
use crate::models::MerchantConfig;

/// 商户积分配置仓储
pub struct MerchantSettingsRepository {
    pool: PgPool,
}

impl MerchantSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_settings(&self, merchant_id: Uuid) -> Result<Option<MerchantConfig>> {
        let row = sqlx::query(
            r#"
            SELECT merchant_id, points_per_unit, minimum_purchase, daily_points_limit,
                   gift_card_threshold, gift_card_value, gift_card_expiry_days, timezone
            FROM merchant_settings
            WHERE merchant_id = $1
            "#,
        )
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_config).transpose()
    }

    pub async fn save_settings(&self, config: &MerchantConfig) -> Result<()> {
        config.validate()?;

        sqlx::query(
            r#"
            INSERT INTO merchant_settings (merchant_id, points_per_unit, minimum_purchase,
                daily_points_limit, gift_card_threshold, gift_card_value, gift_card_expiry_days,
                timezone, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (merchant_id) DO UPDATE SET
                points_per_unit = EXCLUDED.points_per_unit,
                minimum_purchase = EXCLUDED.minimum_purchase,
                daily_points_limit = EXCLUDED.daily_points_limit,
                gift_card_threshold = EXCLUDED.gift_card_threshold,
                gift_card_value = EXCLUDED.gift_card_value,
                gift_card_expiry_days = EXCLUDED.gift_card_expiry_days,
                timezone = EXCLUDED.timezone,
                updated_at = NOW()
            "#,
        )
        .bind(config.merchant_id)
        .bind(config.points_per_unit)
        .bind(config.minimum_purchase)
        .bind(config.daily_points_limit)
        .bind(config.gift_card_threshold)
        .bind(config.gift_card_value)
        .bind(config.gift_card_expiry_days)
        .bind(config.timezone.name())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_config(row: &PgRow) -> Result<MerchantConfig> {
    let timezone: String = row.try_get("timezone")?;
    let timezone = timezone
        .parse::<Tz>()
        .map_err(|_| RewardsError::InvalidConfig(format!("未知时区: {timezone}")))?;

    Ok(MerchantConfig {
        merchant_id: row.try_get("merchant_id")?,
        points_per_unit: row.try_get("points_per_unit")?,
        minimum_purchase: row.try_get("minimum_purchase")?,
        daily_points_limit: row.try_get("daily_points_limit")?,
        gift_card_threshold: row.try_get("gift_card_threshold")?,
        gift_card_value: row.try_get("gift_card_value")?,
        gift_card_expiry_days: row.try_get("gift_card_expiry_days")?,
        timezone,
    })
}

#[async_trait]
impl MerchantSettingsRepositoryTrait for MerchantSettingsRepository {
    async fn get_settings(&self, merchant_id: Uuid) -> Result<Option<MerchantConfig>> {
        self.get_settings(merchant_id).await
    }

    async fn save_settings(&self, config: &MerchantConfig) -> Result<()> {
        self.save_settings(config).await
    }
}
