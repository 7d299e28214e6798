//! 积分账本服务
//!
//! 账本是余额的唯一来源。每次追加：
//!
//! 1. 参数与商户校验 -> 2. 幂等键检查 -> 3. 余额校验（不允许为负）
//!    -> 4. 计算门槛跨越应发的礼品卡 -> 5. 带版本条件的原子提交
//!
//! 提交失败于版本冲突时返回 `ConcurrencyConflict`，由调用方携带同一幂等键重试。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use loyalty_shared::observability::metrics as obs;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::BalanceReport;
use crate::error::{Result, RewardsError};
use crate::gift_card::GiftCardIssuer;
use crate::models::{
    AppendReceipt, AppendRequest, AppendStatus, Customer, EntryKind, LedgerCommit, LedgerEntry,
    MerchantConfig,
};
use crate::points::CalendarWindow;
use crate::repository::{CustomerRepositoryTrait, LedgerRepositoryTrait};

/// 单次查询返回的账本条目上限
const MAX_LIST_LIMIT: i64 = 500;

/// 积分账本
#[derive(Clone)]
pub struct RewardLedger {
    customers: Arc<dyn CustomerRepositoryTrait>,
    ledger: Arc<dyn LedgerRepositoryTrait>,
}

impl RewardLedger {
    pub fn new(
        customers: Arc<dyn CustomerRepositoryTrait>,
        ledger: Arc<dyn LedgerRepositoryTrait>,
    ) -> Self {
        Self { customers, ledger }
    }

    /// 追加账本条目
    ///
    /// 幂等重放返回 `AppendStatus::Duplicate` 和原条目，不产生任何变更
    #[instrument(
        skip(self, config),
        fields(
            customer_id = %request.customer_id,
            kind = request.kind.as_str(),
            delta = request.delta,
            idempotency_key = %request.idempotency_key
        )
    )]
    pub async fn append(
        &self,
        request: AppendRequest,
        config: &MerchantConfig,
    ) -> Result<AppendReceipt> {
        let kind = request.kind;
        let result = self.append_inner(request, config).await;

        let status = match &result {
            Ok(receipt) if receipt.is_duplicate() => "duplicate",
            Ok(_) => "applied",
            Err(RewardsError::ConcurrencyConflict) => "conflict",
            Err(_) => "rejected",
        };
        obs::record_ledger_append(kind.as_str(), status);

        result
    }

    async fn append_inner(
        &self,
        request: AppendRequest,
        config: &MerchantConfig,
    ) -> Result<AppendReceipt> {
        Self::validate_request(&request, config)?;

        let customer = self.get_customer(request.customer_id).await?;
        if customer.merchant_id != request.merchant_id {
            return Err(RewardsError::MerchantMismatch {
                expected: customer.merchant_id,
                actual: request.merchant_id,
            });
        }

        if let Some(existing) = self
            .ledger
            .find_by_idempotency_key(request.merchant_id, &request.idempotency_key)
            .await?
        {
            if !request.matches_entry(&existing) {
                warn!(
                    existing_entry_id = %existing.id,
                    existing_delta = existing.delta,
                    "幂等键被不同的请求复用"
                );
                return Err(RewardsError::IdempotencyKeyReused(request.idempotency_key));
            }

            info!(entry_id = %existing.id, "幂等重放，返回原条目");
            return Ok(AppendReceipt {
                status: AppendStatus::Duplicate,
                entry: existing,
                customer,
                issued_gift_cards: Vec::new(),
            });
        }

        let new_balance = customer
            .balance
            .checked_add(request.delta)
            .ok_or_else(|| RewardsError::Validation("积分变动溢出".to_string()))?;
        if new_balance < 0 {
            return Err(RewardsError::InsufficientBalance {
                balance: customer.balance,
                delta: request.delta,
            });
        }
        let new_lifetime = customer.lifetime_points.saturating_add(request.delta.max(0));

        let now = Utc::now();
        let visit = request.visit;
        let entry = LedgerEntry {
            id: Uuid::now_v7(),
            customer_id: customer.id,
            merchant_id: customer.merchant_id,
            kind: request.kind,
            delta: request.delta,
            balance_after: new_balance,
            description: request.description,
            purchase_amount: request.purchase_amount,
            idempotency_key: request.idempotency_key,
            challenge_bonuses: request.challenge_bonuses,
            daily_limit_clamp: request.daily_limit_clamp,
            operator: request.operator,
            created_at: request.occurred_at.unwrap_or(now),
        };

        let gift_cards = GiftCardIssuer::on_balance_changed(
            customer.id,
            customer.merchant_id,
            customer.lifetime_points,
            new_lifetime,
            config,
            now,
        );

        let projected = Customer {
            balance: new_balance,
            lifetime_points: new_lifetime,
            updated_at: now,
            ..customer.clone()
        };

        let commit = LedgerCommit {
            expected_version: customer.version,
            entry,
            customer: projected,
            gift_cards,
            visit,
        };
        let (customer, issued) = self.ledger.commit_append(&commit).await?;

        if !issued.is_empty() {
            obs::record_gift_cards_issued(issued.len() as u64, "threshold");
            info!(
                count = issued.len(),
                lifetime_points = customer.lifetime_points,
                "跨越门槛，发放礼品卡"
            );
        }

        info!(
            entry_id = %commit.entry.id,
            balance_after = customer.balance,
            "账本条目已追加"
        );

        Ok(AppendReceipt {
            status: AppendStatus::Applied,
            entry: commit.entry,
            customer,
            issued_gift_cards: issued,
        })
    }

    fn validate_request(request: &AppendRequest, config: &MerchantConfig) -> Result<()> {
        if request.idempotency_key.trim().is_empty() {
            return Err(RewardsError::Validation("幂等键不能为空".to_string()));
        }
        if !request.kind.accepts_delta(request.delta) {
            return Err(RewardsError::Validation(format!(
                "{} 条目不接受变动值 {}",
                request.kind.as_str(),
                request.delta
            )));
        }
        if config.merchant_id != request.merchant_id {
            return Err(RewardsError::MerchantMismatch {
                expected: config.merchant_id,
                actual: request.merchant_id,
            });
        }
        config.validate()
    }

    async fn get_customer(&self, customer_id: Uuid) -> Result<Customer> {
        self.customers
            .get_customer(customer_id)
            .await?
            .ok_or(RewardsError::CustomerNotFound(customer_id))
    }

    /// 当前余额
    pub async fn balance(&self, customer_id: Uuid) -> Result<i64> {
        Ok(self.get_customer(customer_id).await?.balance)
    }

    /// 最近的账本条目（倒序）
    pub async fn list_entries(&self, customer_id: Uuid, limit: i64) -> Result<Vec<LedgerEntry>> {
        self.ledger
            .list_entries(customer_id, limit.clamp(1, MAX_LIST_LIMIT))
            .await
    }

    /// 用账本复算余额，与顾客记录上的投影对比
    #[instrument(skip(self))]
    pub async fn verify_balance(&self, customer_id: Uuid) -> Result<BalanceReport> {
        let customer = self.get_customer(customer_id).await?;
        let (ledger_balance, ledger_lifetime) = self.ledger.sum_deltas(customer_id).await?;

        let report = BalanceReport {
            customer_id,
            projected_balance: customer.balance,
            ledger_balance,
            projected_lifetime: customer.lifetime_points,
            ledger_lifetime,
        };
        if !report.is_consistent() {
            warn!(?report, "余额投影与账本不一致");
        }
        Ok(report)
    }

    /// 商户本地自然日内已获得的消费积分
    ///
    /// 只统计 `earn` 条目，人工调整不占用每日额度
    pub async fn points_today(
        &self,
        customer_id: Uuid,
        config: &MerchantConfig,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        let day = CalendarWindow::day_of(at, config.timezone);
        let entries = self.ledger.list_entries_since(customer_id, day.start).await?;
        Ok(earned_within(&entries, &day))
    }
}

pub(crate) fn earned_within(entries: &[LedgerEntry], window: &CalendarWindow) -> i64 {
    entries
        .iter()
        .filter(|e| e.kind == EntryKind::Earn && window.contains(e.created_at))
        .map(|e| e.delta)
        .sum()
}
