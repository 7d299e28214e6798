//! 积分引擎流程集成测试
//!
//! 使用内存存储跑完整业务流程：签到、消费记分、挑战奖励、门槛发卡、核销与过期。

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use rewards_engine::repository::{ChallengeRepositoryTrait, LedgerRepositoryTrait};
use rewards_engine::service::{CheckInRequest, RecordPurchaseRequest};
use rewards_engine::{
    AppendRequest, Challenge, ChallengeRule, Customer, EntryKind, FrequencyPeriod,
    GiftCardStatus, LoyaltyService, MemoryStore, MerchantConfig, NotificationSender,
    RewardsError,
};

// ==================== 测试辅助 ====================

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

struct Harness {
    store: Arc<MemoryStore>,
    service: LoyaltyService,
    config: MerchantConfig,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let service = LoyaltyService::with_store(store.clone(), NotificationSender::default());
        let config = MerchantConfig::new(Uuid::now_v7());
        Self {
            store,
            service,
            config,
        }
    }

    async fn customer(&self, phone: &str) -> Customer {
        self.service
            .check_in(CheckInRequest {
                merchant_id: self.config.merchant_id,
                phone: phone.to_string(),
                name: "测试顾客".to_string(),
                visited_at: Some(utc("2026-01-01T10:00:00Z")),
            })
            .await
            .unwrap()
            .customer
    }

    async fn adjust(&self, customer: &Customer, delta: i64, key: &str) {
        let request = AppendRequest::new(
            customer.id,
            self.config.merchant_id,
            EntryKind::Adjustment,
            delta,
            key,
        );
        self.service
            .append_ledger_entry(request, &self.config)
            .await
            .unwrap();
    }

    async fn purchase(&self, customer: &Customer, amount: Decimal, txid: &str, at: &str) -> i64 {
        let request =
            RecordPurchaseRequest::new(self.config.merchant_id, customer.id, amount, txid)
                .at(utc(at));
        self.service
            .record_purchase(request, &self.config)
            .await
            .unwrap()
            .outcome
            .total_points()
    }

    async fn assert_ledger_consistent(&self, customer_id: Uuid) {
        let report = self.service.ledger().verify_balance(customer_id).await.unwrap();
        assert!(report.is_consistent(), "余额投影与账本不一致: {report:?}");
        assert!(report.projected_balance >= 0);
    }
}

// ==================== 账本 ====================

#[tokio::test]
async fn test_balance_equals_sum_of_entries() {
    let h = Harness::new();
    let c = h.customer("5550100").await;

    h.purchase(&c, dec!(42.50), "T-1", "2026-03-02T12:00:00Z").await;
    h.adjust(&c, 30, "adj-1").await;
    let redeem = AppendRequest::new(c.id, h.config.merchant_id, EntryKind::Redemption, -50, "r-1");
    h.service.append_ledger_entry(redeem, &h.config).await.unwrap();

    assert_eq!(h.service.ledger().balance(c.id).await.unwrap(), 22);
    h.assert_ledger_consistent(c.id).await;

    let (balance, lifetime) = h.store.sum_deltas(c.id).await.unwrap();
    assert_eq!(balance, 22);
    assert_eq!(lifetime, 72);
}

#[tokio::test]
async fn test_overdraft_is_rejected_without_side_effects() {
    let h = Harness::new();
    let c = h.customer("5550101").await;
    h.adjust(&c, 30, "adj-1").await;

    let redeem = AppendRequest::new(c.id, h.config.merchant_id, EntryKind::Redemption, -31, "r-1");
    let err = h
        .service
        .append_ledger_entry(redeem, &h.config)
        .await
        .unwrap_err();
    assert!(matches!(err, RewardsError::InsufficientBalance { .. }));
    assert_eq!(h.store.entry_count(), 1);
    assert_eq!(h.service.ledger().balance(c.id).await.unwrap(), 30);
}

#[tokio::test]
async fn test_idempotent_replay_returns_original_entry() {
    let h = Harness::new();
    let c = h.customer("5550102").await;

    let request = AppendRequest::new(c.id, h.config.merchant_id, EntryKind::Adjustment, 15, "k-1");
    let first = h
        .service
        .append_ledger_entry(request.clone(), &h.config)
        .await
        .unwrap();
    let replay = h
        .service
        .append_ledger_entry(request, &h.config)
        .await
        .unwrap();

    assert!(!first.is_duplicate());
    assert!(replay.is_duplicate());
    assert_eq!(replay.entry.id, first.entry.id);
    assert_eq!(h.store.entry_count(), 1);
    assert_eq!(h.service.ledger().balance(c.id).await.unwrap(), 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_serialize_per_customer() {
    let h = Arc::new(Harness::new());
    let c = h.customer("5550103").await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let h = h.clone();
        let customer_id = c.id;
        handles.push(tokio::spawn(async move {
            loop {
                let request = AppendRequest::new(
                    customer_id,
                    h.config.merchant_id,
                    EntryKind::Adjustment,
                    10,
                    format!("concurrent-{i}"),
                );
                match h.service.append_ledger_entry(request, &h.config).await {
                    Ok(_) => break,
                    Err(e) if e.is_retryable() => tokio::task::yield_now().await,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(h.service.ledger().balance(c.id).await.unwrap(), 200);
    assert_eq!(h.store.entry_count(), 20);
    h.assert_ledger_consistent(c.id).await;

    // 跨越 100 与 200 两个门槛，各发一张
    let cards = h.service.list_gift_cards(c.id, None).await.unwrap();
    let milestones: Vec<i64> = cards.iter().map(|c| c.milestone).collect();
    assert_eq!(milestones, vec![1, 2]);
}

// ==================== 礼品卡 ====================

#[tokio::test]
async fn test_crossing_threshold_issues_one_card() {
    let h = Harness::new();
    let c = h.customer("5550104").await;
    h.adjust(&c, 80, "seed").await;

    let points = h.purchase(&c, dec!(25.00), "T-1", "2026-03-02T12:00:00Z").await;
    assert_eq!(points, 25);
    assert_eq!(h.service.ledger().balance(c.id).await.unwrap(), 105);

    let cards = h
        .service
        .list_gift_cards(c.id, Some(GiftCardStatus::Available))
        .await
        .unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].value, dec!(5));
    assert_eq!(cards[0].milestone, 1);
}

#[tokio::test]
async fn test_crossing_two_thresholds_issues_two_cards() {
    let h = Harness::new();
    let c = h.customer("5550105").await;
    h.adjust(&c, 95, "seed").await;
    h.adjust(&c, 110, "jump").await;

    let cards = h.service.list_gift_cards(c.id, None).await.unwrap();
    assert_eq!(cards.len(), 2);

    // 兑换积分不会让已跨越的门槛重新计数
    let redeem = AppendRequest::new(c.id, h.config.merchant_id, EntryKind::Redemption, -150, "r-1");
    h.service.append_ledger_entry(redeem, &h.config).await.unwrap();
    h.adjust(&c, 50, "again").await;
    let cards = h.service.list_gift_cards(c.id, None).await.unwrap();
    assert_eq!(cards.len(), 2);
}

#[tokio::test]
async fn test_disabled_threshold_issues_nothing() {
    let mut h = Harness::new();
    h.config.gift_card_threshold = 0;
    let c = h.customer("5550106").await;
    h.adjust(&c, 500, "seed").await;

    assert!(h.service.list_gift_cards(c.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_redeem_twice_reports_already_redeemed() {
    let h = Harness::new();
    let c = h.customer("5550107").await;
    h.adjust(&c, 100, "seed").await;

    let card = h.service.list_gift_cards(c.id, None).await.unwrap().remove(0);
    let redeemed = h.service.redeem_gift_card(card.id).await.unwrap();
    assert_eq!(redeemed.status, GiftCardStatus::Redeemed);
    assert!(redeemed.redeemed_at.is_some());

    let err = h.service.redeem_gift_card(card.id).await.unwrap_err();
    assert!(matches!(err, RewardsError::AlreadyRedeemed(_)));
}

#[tokio::test]
async fn test_redeem_by_code_accepts_loose_input() {
    let h = Harness::new();
    let c = h.customer("5550108").await;
    h.adjust(&c, 100, "seed").await;

    let card = h.service.list_gift_cards(c.id, None).await.unwrap().remove(0);
    let typed = format!("  {}  ", card.code.to_lowercase());
    let redeemed = h
        .service
        .redeem_gift_card_by_code(h.config.merchant_id, &typed)
        .await
        .unwrap();
    assert_eq!(redeemed.id, card.id);
}

#[tokio::test]
async fn test_overdue_card_expires_on_redeem() {
    let mut h = Harness::new();
    h.config.gift_card_expiry_days = Some(30);
    let c = h.customer("5550109").await;
    h.adjust(&c, 100, "seed").await;

    let card = h.service.list_gift_cards(c.id, None).await.unwrap().remove(0);
    let later = Utc::now() + Duration::days(31);

    let err = h.service.gift_cards().redeem(card.id, later).await.unwrap_err();
    assert!(matches!(err, RewardsError::Expired(_)));

    let stored = h.service.gift_cards().get_gift_card(card.id, later).await.unwrap();
    assert_eq!(stored.status, GiftCardStatus::Expired);
    assert!(stored.expired_at.is_some());

    let err = h.service.gift_cards().redeem(card.id, later).await.unwrap_err();
    assert!(matches!(err, RewardsError::AlreadyExpired(_)));
}

#[tokio::test]
async fn test_reconcile_fills_missing_milestones() {
    let h = Harness::new();
    let c = h.customer("5550110").await;

    // 关闭发卡时累计的积分，重新开启后补发
    let mut disabled = h.config.clone();
    disabled.gift_card_threshold = 0;
    let request = AppendRequest::new(c.id, h.config.merchant_id, EntryKind::Adjustment, 250, "seed");
    h.service.append_ledger_entry(request, &disabled).await.unwrap();
    assert!(h.service.list_gift_cards(c.id, None).await.unwrap().is_empty());

    let issued = h.service.reconcile_gift_cards(c.id, &h.config).await.unwrap();
    assert_eq!(issued.len(), 2);

    let again = h.service.reconcile_gift_cards(c.id, &h.config).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(h.store.gift_card_count(), 2);
}

// ==================== 挑战 ====================

#[tokio::test]
async fn test_weekly_frequency_bonus_once_per_week() {
    let h = Harness::new();
    let c = h.customer("5550111").await;

    let challenge = Challenge::new(
        h.config.merchant_id,
        "一周三次",
        ChallengeRule::Frequency {
            period: FrequencyPeriod::Weekly,
            visits_required: 3,
        },
        20,
    );
    h.store.create_challenge(&challenge).await.unwrap();

    // 2026-03-02 是周一
    assert_eq!(h.purchase(&c, dec!(10), "T-1", "2026-03-02T12:00:00Z").await, 10);
    assert_eq!(h.purchase(&c, dec!(10), "T-2", "2026-03-03T12:00:00Z").await, 10);
    assert_eq!(h.purchase(&c, dec!(10), "T-3", "2026-03-04T12:00:00Z").await, 30);
    assert_eq!(h.purchase(&c, dec!(10), "T-4", "2026-03-05T12:00:00Z").await, 10);

    // 下一周重新计数
    assert_eq!(h.purchase(&c, dec!(10), "T-5", "2026-03-09T12:00:00Z").await, 10);

    assert!(h.store.has_challenge_awards(challenge.id).await.unwrap());
    let err = h.service.challenges().delete(challenge.id).await.unwrap_err();
    assert!(matches!(err, RewardsError::ChallengeHasAwards(_)));
}

#[tokio::test]
async fn test_multiple_challenges_stack() {
    let h = Harness::new();
    let c = h.customer("5550112").await;

    let big_spender = Challenge::new(
        h.config.merchant_id,
        "满 50",
        ChallengeRule::AmountMin {
            min_amount: dec!(50),
        },
        10,
    );
    let happy_hour = Challenge::new(
        h.config.merchant_id,
        "下午茶",
        ChallengeRule::TimeBased {
            start_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        },
        5,
    );
    let paused = Challenge::new(
        h.config.merchant_id,
        "已暂停",
        ChallengeRule::AmountMin {
            min_amount: dec!(1),
        },
        100,
    )
    .paused();
    for challenge in [&big_spender, &happy_hour, &paused] {
        h.store.create_challenge(challenge).await.unwrap();
    }

    let points = h.purchase(&c, dec!(60), "T-1", "2026-03-02T15:30:00Z").await;
    assert_eq!(points, 75);

    let entries = h.service.ledger().list_entries(c.id, 10).await.unwrap();
    assert_eq!(entries[0].challenge_bonuses.len(), 2);
}

#[tokio::test]
async fn test_daily_limit_clamps_bonus_first() {
    let mut h = Harness::new();
    h.config.daily_points_limit = Some(50);
    let c = h.customer("5550113").await;

    let challenge = Challenge::new(
        h.config.merchant_id,
        "满 30",
        ChallengeRule::AmountMin {
            min_amount: dec!(30),
        },
        20,
    );
    h.store.create_challenge(&challenge).await.unwrap();

    assert_eq!(h.purchase(&c, dec!(40), "T-1", "2026-03-02T09:00:00Z").await, 50);
    // 当日额度已用完，仅记到店
    assert_eq!(h.purchase(&c, dec!(40), "T-2", "2026-03-02T18:00:00Z").await, 0);
    // 次日恢复
    assert_eq!(h.purchase(&c, dec!(40), "T-3", "2026-03-03T09:00:00Z").await, 50);

    assert_eq!(h.service.ledger().balance(c.id).await.unwrap(), 100);
    h.assert_ledger_consistent(c.id).await;
}

#[tokio::test]
async fn test_unscored_retry_does_not_feed_frequency_bonus() {
    let mut h = Harness::new();
    h.config.minimum_purchase = dec!(10);
    let c = h.customer("5550115").await;

    let challenge = Challenge::new(
        h.config.merchant_id,
        "一天三次",
        ChallengeRule::Frequency {
            period: FrequencyPeriod::Daily,
            visits_required: 3,
        },
        50,
    );
    h.store.create_challenge(&challenge).await.unwrap();

    // 低于最低消费的交易重试两次，只算一次到店
    assert_eq!(h.purchase(&c, dec!(5), "T-1", "2026-03-02T09:00:00Z").await, 0);
    assert_eq!(h.purchase(&c, dec!(5), "T-1", "2026-03-02T09:00:00Z").await, 0);
    assert_eq!(h.purchase(&c, dec!(20), "T-2", "2026-03-02T10:00:00Z").await, 20);

    assert_eq!(h.service.ledger().balance(c.id).await.unwrap(), 20);
    assert!(!h.store.has_challenge_awards(challenge.id).await.unwrap());
}

#[tokio::test]
async fn test_challenge_edit_keeps_historical_snapshot() {
    let h = Harness::new();
    let c = h.customer("5550114").await;

    let challenge = h
        .service
        .challenges()
        .create(rewards_engine::service::CreateChallengeRequest {
            merchant_id: h.config.merchant_id,
            name: "满 10".to_string(),
            description: None,
            rule: ChallengeRule::AmountMin {
                min_amount: dec!(10),
            },
            points: 5,
            starts_at: None,
            ends_at: None,
        })
        .await
        .unwrap();

    h.purchase(&c, dec!(10), "T-1", "2026-03-02T12:00:00Z").await;

    h.service
        .challenges()
        .update(
            challenge.id,
            rewards_engine::service::UpdateChallengeRequest {
                points: Some(50),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let entries = h.service.ledger().list_entries(c.id, 10).await.unwrap();
    let snapshot = &entries[0].challenge_bonuses[0];
    assert_eq!(snapshot.points, 5);
    assert_eq!(snapshot.challenge_version, 1);

    let stored = h.store.get_challenge(challenge.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
}

// ==================== PostgreSQL ====================

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_postgres_purchase_flow() {
    use loyalty_shared::config::DatabaseConfig;
    use loyalty_shared::database::Database;
    use rewards_engine::repository::{
        ChallengeRepository, CustomerRepository, GiftCardRepository, LedgerRepository,
        MerchantSettingsRepository,
    };

    let config = DatabaseConfig {
        url: std::env::var("DATABASE_URL").unwrap_or_else(|_| DatabaseConfig::default().url),
        ..Default::default()
    };
    let db = Database::connect(&config).await.unwrap();
    db.run_migrations(&sqlx::migrate!("./migrations")).await.unwrap();

    let pool = db.pool().clone();
    let service = LoyaltyService::new(
        Arc::new(CustomerRepository::new(pool.clone())),
        Arc::new(LedgerRepository::new(pool.clone())),
        Arc::new(GiftCardRepository::new(pool.clone())),
        Arc::new(ChallengeRepository::new(pool.clone())),
        Arc::new(MerchantSettingsRepository::new(pool)),
        NotificationSender::default(),
    );

    let merchant_config = MerchantConfig::new(Uuid::now_v7());
    service.save_merchant_config(&merchant_config).await.unwrap();
    let loaded = service
        .load_merchant_config(merchant_config.merchant_id)
        .await
        .unwrap();
    assert_eq!(loaded, merchant_config);

    let (customer, created) = service
        .find_or_create_customer(merchant_config.merchant_id, "5550199", "PG")
        .await
        .unwrap();
    assert!(created);

    let txid = Uuid::now_v7().to_string();
    let request =
        RecordPurchaseRequest::new(merchant_config.merchant_id, customer.id, dec!(120), txid);
    let result = service
        .record_purchase(request.clone(), &merchant_config)
        .await
        .unwrap();
    let receipt = result.receipt.unwrap();
    assert_eq!(receipt.customer.balance, 120);
    assert_eq!(receipt.customer.visit_count, 1);
    assert_eq!(receipt.issued_gift_cards.len(), 1);

    let replay = service
        .record_purchase(request, &merchant_config)
        .await
        .unwrap();
    let replay = replay.receipt.unwrap();
    assert!(replay.is_duplicate());
    assert_eq!(replay.customer.visit_count, 1);

    let report = service.ledger().verify_balance(customer.id).await.unwrap();
    assert!(report.is_consistent());

    db.close().await;
}
