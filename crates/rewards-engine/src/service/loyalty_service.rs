//! 积分引擎门面服务
//!
//! 串联签到、计分、记账、礼品卡与通知，是 POS 侧唯一需要持有的入口。
//!
//! ## 消费记分流程
//!
//! 1. 账本或到店记录中已有该交易 -> 返回原结果，不重复计分、不重复记到店
//! 2. 组装近期活动（本次到店之前的到店记录、挑战奖励、当日已得积分）
//! 3. 计算积分 -> 追加 `earn` 条目，礼品卡与本次到店在同一事务内写入
//! 4. 不计分的消费只记录到店，到店记录同样以交易幂等键去重
//! 5. 异步发送积分与礼品卡通知

use std::sync::Arc;

use chrono::{DateTime, Utc};
use loyalty_shared::observability::metrics as obs;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::challenge_service::ChallengeService;
use super::dto::{CheckInRequest, CheckInResult, PurchaseResult, RecordPurchaseRequest};
use super::gift_card_service::GiftCardService;
use super::ledger_service::{RewardLedger, earned_within};
use crate::error::{Result, RewardsError};
use crate::models::{
    AppendReceipt, AppendRequest, AppendStatus, Customer, CustomerActivity, EntryKind,
    FrequencyPeriod, GiftCard, GiftCardStatus, LedgerEntry, MerchantConfig, PointsAward,
    PointsOutcome, Purchase, Visit,
};
use crate::notification::NotificationSender;
use crate::points::{CalendarWindow, PointsCalculator};
use crate::repository::{
    ChallengeRepositoryTrait, CustomerRepositoryTrait, GiftCardRepositoryTrait,
    LedgerRepositoryTrait, MerchantSettingsRepositoryTrait,
};

/// 积分引擎门面
#[derive(Clone)]
pub struct LoyaltyService {
    customers: Arc<dyn CustomerRepositoryTrait>,
    ledger_repo: Arc<dyn LedgerRepositoryTrait>,
    challenge_repo: Arc<dyn ChallengeRepositoryTrait>,
    settings: Arc<dyn MerchantSettingsRepositoryTrait>,
    ledger: RewardLedger,
    gift_cards: GiftCardService,
    challenges: ChallengeService,
    calculator: PointsCalculator,
    notifier: NotificationSender,
}

impl LoyaltyService {
    pub fn new(
        customers: Arc<dyn CustomerRepositoryTrait>,
        ledger_repo: Arc<dyn LedgerRepositoryTrait>,
        gift_card_repo: Arc<dyn GiftCardRepositoryTrait>,
        challenge_repo: Arc<dyn ChallengeRepositoryTrait>,
        settings: Arc<dyn MerchantSettingsRepositoryTrait>,
        notifier: NotificationSender,
    ) -> Self {
        Self {
            ledger: RewardLedger::new(customers.clone(), ledger_repo.clone()),
            gift_cards: GiftCardService::new(gift_card_repo, customers.clone()),
            challenges: ChallengeService::new(challenge_repo.clone(), ledger_repo.clone()),
            calculator: PointsCalculator::new(),
            customers,
            ledger_repo,
            challenge_repo,
            settings,
            notifier,
        }
    }

    /// 用同一个存储实现全部仓储（内存存储或测试替身）
    pub fn with_store<S>(store: Arc<S>, notifier: NotificationSender) -> Self
    where
        S: CustomerRepositoryTrait
            + LedgerRepositoryTrait
            + GiftCardRepositoryTrait
            + ChallengeRepositoryTrait
            + MerchantSettingsRepositoryTrait
            + 'static,
    {
        Self::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            notifier,
        )
    }

    pub fn ledger(&self) -> &RewardLedger {
        &self.ledger
    }

    pub fn gift_cards(&self) -> &GiftCardService {
        &self.gift_cards
    }

    pub fn challenges(&self) -> &ChallengeService {
        &self.challenges
    }

    /// 读取商户配置，未保存过时使用默认配置
    pub async fn load_merchant_config(&self, merchant_id: Uuid) -> Result<MerchantConfig> {
        Ok(self
            .settings
            .get_settings(merchant_id)
            .await?
            .unwrap_or_else(|| MerchantConfig::new(merchant_id)))
    }

    /// 保存商户配置
    pub async fn save_merchant_config(&self, config: &MerchantConfig) -> Result<()> {
        config.validate()?;
        self.settings.save_settings(config).await?;
        info!(merchant_id = %config.merchant_id, "商户配置已保存");
        Ok(())
    }

    /// 按手机号查找顾客，不存在时建档
    ///
    /// 不记录到店，供只做身份识别的场景使用
    pub async fn find_or_create_customer(
        &self,
        merchant_id: Uuid,
        phone: &str,
        name: &str,
    ) -> Result<(Customer, bool)> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(RewardsError::Validation("手机号不能为空".to_string()));
        }

        if let Some(existing) = self.customers.find_by_phone(merchant_id, phone).await? {
            return Ok((existing, false));
        }

        let customer = self
            .customers
            .create_customer(&Customer::new(merchant_id, phone, name.trim()))
            .await?;
        info!(customer_id = %customer.id, merchant_id = %merchant_id, "新顾客建档");
        Ok((customer, true))
    }

    /// 到店签到（不含消费）
    ///
    /// 记一次到店，计入频次挑战；带消费的到店请直接调用 [`Self::record_purchase`]
    #[instrument(skip(self, request), fields(merchant_id = %request.merchant_id))]
    pub async fn check_in(&self, request: CheckInRequest) -> Result<CheckInResult> {
        let (customer, is_new_customer) = self
            .find_or_create_customer(request.merchant_id, &request.phone, &request.name)
            .await?;

        let visit = Visit::new(
            customer.id,
            customer.merchant_id,
            request.visited_at.unwrap_or_else(Utc::now),
        );
        self.customers.record_visit(&visit).await?;

        let customer = self.get_customer(customer.id).await?;
        info!(customer_id = %customer.id, visit_count = customer.visit_count, "顾客到店");

        Ok(CheckInResult {
            customer,
            visit,
            is_new_customer,
        })
    }

    /// 预估一笔消费的积分，不写入任何数据
    pub async fn calculate_points(
        &self,
        customer_id: Uuid,
        purchase: &Purchase,
        config: &MerchantConfig,
    ) -> Result<PointsOutcome> {
        let customer = self.get_customer(customer_id).await?;
        ensure_same_merchant(&customer, config)?;

        let challenges = self.challenge_repo.list_by_merchant(config.merchant_id).await?;
        let activity = self
            .build_activity(&customer, config, purchase.occurred_at, None)
            .await?;
        self.calculator
            .calculate(purchase, config, &challenges, &activity)
    }

    /// 消费记分
    ///
    /// 同一交易号重试返回原条目，`receipt.status` 为 `Duplicate`；
    /// 原交易未计分时重试同样不写入，`receipt` 为空
    #[instrument(
        skip(self, request, config),
        fields(
            customer_id = %request.customer_id,
            amount = %request.amount,
            transaction_id = %request.transaction_id
        )
    )]
    pub async fn record_purchase(
        &self,
        request: RecordPurchaseRequest,
        config: &MerchantConfig,
    ) -> Result<PurchaseResult> {
        if request.merchant_id != config.merchant_id {
            return Err(RewardsError::MerchantMismatch {
                expected: config.merchant_id,
                actual: request.merchant_id,
            });
        }
        if request.transaction_id.trim().is_empty() {
            return Err(RewardsError::Validation("交易号不能为空".to_string()));
        }

        let idempotency_key = request.idempotency_key();
        if let Some(existing) = self
            .ledger_repo
            .find_by_idempotency_key(request.merchant_id, &idempotency_key)
            .await?
        {
            return self.replayed_purchase(&request, existing).await;
        }

        let customer = self.get_customer(request.customer_id).await?;
        ensure_same_merchant(&customer, config)?;

        let occurred_at = request.occurred_at.unwrap_or_else(Utc::now);
        let mut purchase = Purchase::new(request.amount, occurred_at);
        purchase.category = request.category.clone();

        let challenges = self.challenge_repo.list_by_merchant(config.merchant_id).await?;
        let activity = self
            .build_activity(&customer, config, occurred_at, Some(&idempotency_key))
            .await?;
        let outcome = self
            .calculator
            .calculate(&purchase, config, &challenges, &activity)?;

        // 未计分的交易只留下到店记录
        if self
            .customers
            .find_visit_by_key(request.merchant_id, &idempotency_key)
            .await?
            .is_some()
        {
            info!("交易已记录到店且未计分，不重复处理");
            return Ok(PurchaseResult {
                outcome,
                receipt: None,
            });
        }

        let visit = Visit::new(customer.id, customer.merchant_id, occurred_at)
            .with_purchase(request.amount, request.category.clone())
            .with_idempotency_key(idempotency_key.clone());

        let award = match outcome.award() {
            Some(award) if award.total_points > 0 => award,
            _ => {
                if !self.customers.record_visit(&visit).await? {
                    debug!("并发重试已记录到店");
                }
                debug!(outcome = ?outcome, "本次消费不计分，仅记录到店");
                return Ok(PurchaseResult {
                    outcome,
                    receipt: None,
                });
            }
        };

        let mut append = AppendRequest::new(
            customer.id,
            customer.merchant_id,
            EntryKind::Earn,
            award.total_points,
            idempotency_key,
        )
        .with_description(award.describe())
        .with_purchase_amount(request.amount)
        .with_bonuses(award.bonuses.clone())
        .with_clamp(award.clamp.clone())
        .with_visit(visit)
        .at(occurred_at);
        if let Some(operator) = &request.operator {
            append = append.with_operator(operator.clone());
        }

        let receipt = self.ledger.append(append, config).await?;
        if !receipt.is_duplicate() {
            obs::record_points_awarded(award.total_points as u64, award.is_clamped());
            self.notifier
                .notify_points_awarded(&receipt.customer, award);
            self.notify_issued(&receipt.customer, &receipt.issued_gift_cards);
        }

        Ok(PurchaseResult {
            outcome,
            receipt: Some(receipt),
        })
    }

    /// 已提交过的交易：用账本条目还原计分结果
    async fn replayed_purchase(
        &self,
        request: &RecordPurchaseRequest,
        existing: LedgerEntry,
    ) -> Result<PurchaseResult> {
        if existing.customer_id != request.customer_id || existing.kind != EntryKind::Earn {
            return Err(RewardsError::IdempotencyKeyReused(request.idempotency_key()));
        }

        let customer = self.get_customer(existing.customer_id).await?;
        let bonus_points: i64 = existing.challenge_bonuses.iter().map(|b| b.points).sum();
        let award = PointsAward {
            base_points: existing.delta - bonus_points,
            bonuses: existing.challenge_bonuses.clone(),
            total_points: existing.delta,
            clamp: existing.daily_limit_clamp.clone(),
        };
        obs::record_ledger_append(EntryKind::Earn.as_str(), "duplicate");
        info!(entry_id = %existing.id, "交易已记分，返回原结果");

        Ok(PurchaseResult {
            outcome: PointsOutcome::Awarded(award),
            receipt: Some(AppendReceipt {
                status: AppendStatus::Duplicate,
                entry: existing,
                customer,
                issued_gift_cards: Vec::new(),
            }),
        })
    }

    /// 追加任意账本条目（人工调整、积分兑换等）
    pub async fn append_ledger_entry(
        &self,
        request: AppendRequest,
        config: &MerchantConfig,
    ) -> Result<AppendReceipt> {
        let receipt = self.ledger.append(request, config).await?;
        self.notify_issued(&receipt.customer, &receipt.issued_gift_cards);
        Ok(receipt)
    }

    /// 核销礼品卡并通知顾客
    pub async fn redeem_gift_card(&self, gift_card_id: Uuid) -> Result<GiftCard> {
        let card = self.gift_cards.redeem(gift_card_id, Utc::now()).await?;
        self.notify_redeemed(&card).await;
        Ok(card)
    }

    /// 按卡号核销礼品卡并通知顾客
    pub async fn redeem_gift_card_by_code(&self, merchant_id: Uuid, code: &str) -> Result<GiftCard> {
        let card = self
            .gift_cards
            .redeem_by_code(merchant_id, code, Utc::now())
            .await?;
        self.notify_redeemed(&card).await;
        Ok(card)
    }

    pub async fn list_gift_cards(
        &self,
        customer_id: Uuid,
        status: Option<GiftCardStatus>,
    ) -> Result<Vec<GiftCard>> {
        self.gift_cards
            .list_gift_cards(customer_id, status, Utc::now())
            .await
    }

    /// 补发缺失的礼品卡并通知
    pub async fn reconcile_gift_cards(
        &self,
        customer_id: Uuid,
        config: &MerchantConfig,
    ) -> Result<Vec<GiftCard>> {
        let issued = self
            .gift_cards
            .reconcile(customer_id, config, Utc::now())
            .await?;
        if !issued.is_empty() {
            let customer = self.get_customer(customer_id).await?;
            self.notify_issued(&customer, &issued);
        }
        Ok(issued)
    }

    /// 组装计分所需的近期活动
    ///
    /// 回看到本周一与本月一日中较早者，覆盖所有频次周期。
    /// `current_key` 对应的到店记录属于本次交易，不计入历史。
    async fn build_activity(
        &self,
        customer: &Customer,
        config: &MerchantConfig,
        at: DateTime<Utc>,
        current_key: Option<&str>,
    ) -> Result<CustomerActivity> {
        let tz = config.timezone;
        let since = CalendarWindow::containing(FrequencyPeriod::Weekly, at, tz)
            .start
            .min(CalendarWindow::containing(FrequencyPeriod::Monthly, at, tz).start);

        let visits = self
            .customers
            .list_visits_since(customer.id, since)
            .await?
            .into_iter()
            .filter(|v| current_key.is_none() || v.idempotency_key.as_deref() != current_key)
            .map(|v| v.visited_at)
            .filter(|visited_at| *visited_at <= at)
            .collect();

        let entries = self.ledger_repo.list_entries_since(customer.id, since).await?;
        let today = CalendarWindow::day_of(at, tz);

        let mut activity = CustomerActivity::new(customer.id)
            .with_visits(visits)
            .with_points_today(earned_within(&entries, &today));
        for entry in &entries {
            activity.record_bonuses(&entry.challenge_bonuses, entry.created_at);
        }
        Ok(activity)
    }

    async fn get_customer(&self, customer_id: Uuid) -> Result<Customer> {
        self.customers
            .get_customer(customer_id)
            .await?
            .ok_or(RewardsError::CustomerNotFound(customer_id))
    }

    fn notify_issued(&self, customer: &Customer, cards: &[GiftCard]) {
        for card in cards {
            self.notifier.notify_gift_card_issued(customer, card);
        }
    }

    async fn notify_redeemed(&self, card: &GiftCard) {
        // 核销已成功，查询顾客失败只影响通知
        if let Ok(Some(customer)) = self.customers.get_customer(card.customer_id).await {
            self.notifier.notify_gift_card_redeemed(&customer, card);
        }
    }
}

fn ensure_same_merchant(customer: &Customer, config: &MerchantConfig) -> Result<()> {
    if customer.merchant_id != config.merchant_id {
        return Err(RewardsError::MerchantMismatch {
            expected: customer.merchant_id,
            actual: config.merchant_id,
        });
    }
    Ok(())
}
