//! 内存存储
//!
//! 使用 DashMap 实现的内存仓储，语义与 PostgreSQL 实现一致（版本条件提交、
//! 幂等键唯一、门槛倍数唯一、状态比较并设置、到店记录按交易去重），用于测试和本地运行。

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use uuid::Uuid;

use super::traits::{
    ChallengeRepositoryTrait, CustomerRepositoryTrait, GiftCardRepositoryTrait,
    LedgerRepositoryTrait, MerchantSettingsRepositoryTrait,
};
use crate::error::{Result, RewardsError};
use crate::models::{
    Challenge, ChallengeStatus, Customer, GiftCard, GiftCardStatus, LedgerCommit, LedgerEntry,
    MerchantConfig, Visit,
};

/// 内存仓储
///
/// 多张表的提交需要整体原子，账本提交由 `commit_lock` 串行化
#[derive(Debug, Default)]
pub struct MemoryStore {
    customers: DashMap<Uuid, Customer>,
    visits: DashMap<Uuid, Vec<Visit>>,
    visit_keys: DashMap<(Uuid, String), Visit>,
    entries: DashMap<Uuid, Vec<LedgerEntry>>,
    idempotency_keys: DashMap<(Uuid, String), LedgerEntry>,
    gift_cards: DashMap<Uuid, GiftCard>,
    challenges: DashMap<Uuid, Challenge>,
    settings: DashMap<Uuid, MerchantConfig>,
    commit_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 账本条目总数
    pub fn entry_count(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    /// 礼品卡总数
    pub fn gift_card_count(&self) -> usize {
        self.gift_cards.len()
    }

    fn commit(&self, commit: &LedgerCommit) -> Result<(Customer, Vec<GiftCard>)> {
        let _guard = self.commit_lock.lock();

        let customer_id = commit.customer.id;
        let updated = {
            let mut current = self
                .customers
                .get_mut(&customer_id)
                .ok_or(RewardsError::CustomerNotFound(customer_id))?;

            if current.version != commit.expected_version {
                return Err(RewardsError::ConcurrencyConflict);
            }

            let key = (commit.entry.merchant_id, commit.entry.idempotency_key.clone());
            if self.idempotency_keys.contains_key(&key) {
                return Err(RewardsError::IdempotencyKeyReused(key.1));
            }

            // 计算奖励后挑战被删除
            if !commit
                .entry
                .challenge_bonuses
                .iter()
                .all(|b| self.challenges.contains_key(&b.challenge_id))
            {
                return Err(RewardsError::ConcurrencyConflict);
            }

            if let Some(visit) = &commit.visit {
                if self.push_visit(visit) {
                    current.visit_count += 1;
                }
            }
            current.balance = commit.customer.balance;
            current.lifetime_points = commit.customer.lifetime_points;
            current.version += 1;
            current.updated_at = commit.customer.updated_at;
            current.clone()
        };

        self.idempotency_keys.insert(
            (commit.entry.merchant_id, commit.entry.idempotency_key.clone()),
            commit.entry.clone(),
        );
        self.entries
            .entry(customer_id)
            .or_default()
            .push(commit.entry.clone());

        let inserted = self.insert_cards(&commit.gift_cards);
        Ok((updated, inserted))
    }

    /// 写入到店记录，带键且键已存在时返回 false
    fn push_visit(&self, visit: &Visit) -> bool {
        if let Some(key) = &visit.idempotency_key {
            match self.visit_keys.entry((visit.merchant_id, key.clone())) {
                Entry::Occupied(_) => return false,
                Entry::Vacant(slot) => {
                    slot.insert(visit.clone());
                }
            }
        }
        self.visits
            .entry(visit.customer_id)
            .or_default()
            .push(visit.clone());
        true
    }

    fn challenge_awarded(&self, challenge_id: Uuid) -> bool {
        self.entries.iter().any(|entries| {
            entries
                .iter()
                .flat_map(|e| e.challenge_bonuses.iter())
                .any(|b| b.challenge_id == challenge_id)
        })
    }

    fn insert_cards(&self, cards: &[GiftCard]) -> Vec<GiftCard> {
        let mut issued: HashSet<(Uuid, i64)> = self
            .gift_cards
            .iter()
            .map(|c| (c.customer_id, c.milestone))
            .collect();

        cards
            .iter()
            .filter(|card| issued.insert((card.customer_id, card.milestone)))
            .map(|card| {
                self.gift_cards.insert(card.id, card.clone());
                card.clone()
            })
            .collect()
    }
}

#[async_trait]
impl CustomerRepositoryTrait for MemoryStore {
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        Ok(self.customers.get(&id).map(|c| c.clone()))
    }

    async fn find_by_phone(&self, merchant_id: Uuid, phone: &str) -> Result<Option<Customer>> {
        Ok(self
            .customers
            .iter()
            .find(|c| c.merchant_id == merchant_id && c.phone == phone)
            .map(|c| c.value().clone()))
    }

    async fn create_customer(&self, customer: &Customer) -> Result<Customer> {
        let _guard = self.commit_lock.lock();
        let existing = self
            .customers
            .iter()
            .find(|c| c.merchant_id == customer.merchant_id && c.phone == customer.phone)
            .map(|c| c.value().clone());
        if let Some(existing) = existing {
            return Ok(existing);
        }
        self.customers.insert(customer.id, customer.clone());
        Ok(customer.clone())
    }

    async fn record_visit(&self, visit: &Visit) -> Result<bool> {
        let mut customer = self
            .customers
            .get_mut(&visit.customer_id)
            .ok_or(RewardsError::CustomerNotFound(visit.customer_id))?;
        if !self.push_visit(visit) {
            return Ok(false);
        }
        customer.visit_count += 1;
        Ok(true)
    }

    async fn find_visit_by_key(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Visit>> {
        Ok(self
            .visit_keys
            .get(&(merchant_id, idempotency_key.to_string()))
            .map(|v| v.clone()))
    }

    async fn list_visits_since(
        &self,
        customer_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Visit>> {
        let mut visits: Vec<Visit> = self
            .visits
            .get(&customer_id)
            .map(|v| v.iter().filter(|v| v.visited_at >= since).cloned().collect())
            .unwrap_or_default();
        visits.sort_by_key(|v| v.visited_at);
        Ok(visits)
    }
}

#[async_trait]
impl LedgerRepositoryTrait for MemoryStore {
    async fn find_by_idempotency_key(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<LedgerEntry>> {
        Ok(self
            .idempotency_keys
            .get(&(merchant_id, idempotency_key.to_string()))
            .map(|e| e.clone()))
    }

    async fn commit_append(&self, commit: &LedgerCommit) -> Result<(Customer, Vec<GiftCard>)> {
        self.commit(commit)
    }

    async fn list_entries(&self, customer_id: Uuid, limit: i64) -> Result<Vec<LedgerEntry>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .entries
            .get(&customer_id)
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn list_entries_since(
        &self,
        customer_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .entries
            .get(&customer_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.created_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn sum_deltas(&self, customer_id: Uuid) -> Result<(i64, i64)> {
        Ok(self
            .entries
            .get(&customer_id)
            .map(|entries| {
                entries.iter().fold((0, 0), |(total, lifetime), e| {
                    (total + e.delta, lifetime + e.lifetime_contribution())
                })
            })
            .unwrap_or((0, 0)))
    }

    async fn has_challenge_awards(&self, challenge_id: Uuid) -> Result<bool> {
        Ok(self.challenge_awarded(challenge_id))
    }
}

#[async_trait]
impl GiftCardRepositoryTrait for MemoryStore {
    async fn get_gift_card(&self, id: Uuid) -> Result<Option<GiftCard>> {
        Ok(self.gift_cards.get(&id).map(|c| c.clone()))
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<GiftCard>> {
        Ok(self
            .gift_cards
            .iter()
            .find(|c| c.code == code)
            .map(|c| c.value().clone()))
    }

    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        status: Option<GiftCardStatus>,
    ) -> Result<Vec<GiftCard>> {
        let mut cards: Vec<GiftCard> = self
            .gift_cards
            .iter()
            .filter(|c| c.customer_id == customer_id)
            .filter(|c| status.is_none_or(|s| c.status == s))
            .map(|c| c.value().clone())
            .collect();
        cards.sort_by_key(|c| c.milestone);
        Ok(cards)
    }

    async fn list_milestones(&self, customer_id: Uuid) -> Result<Vec<i64>> {
        let mut milestones: Vec<i64> = self
            .gift_cards
            .iter()
            .filter(|c| c.customer_id == customer_id)
            .map(|c| c.milestone)
            .collect();
        milestones.sort_unstable();
        Ok(milestones)
    }

    async fn insert_gift_cards(&self, cards: &[GiftCard]) -> Result<Vec<GiftCard>> {
        let _guard = self.commit_lock.lock();
        Ok(self.insert_cards(cards))
    }

    async fn transition_status(&self, card: &GiftCard, from: GiftCardStatus) -> Result<bool> {
        let Some(mut current) = self.gift_cards.get_mut(&card.id) else {
            return Ok(false);
        };
        if current.status != from {
            return Ok(false);
        }
        current.status = card.status;
        current.redeemed_at = card.redeemed_at;
        current.expired_at = card.expired_at;
        Ok(true)
    }

    async fn list_overdue(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<GiftCard>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let mut cards: Vec<GiftCard> = self
            .gift_cards
            .iter()
            .filter(|c| c.status == GiftCardStatus::Available && c.is_past_expiry(now))
            .map(|c| c.value().clone())
            .collect();
        cards.sort_by_key(|c| c.expires_at);
        cards.truncate(limit);
        Ok(cards)
    }
}

#[async_trait]
impl ChallengeRepositoryTrait for MemoryStore {
    async fn get_challenge(&self, id: Uuid) -> Result<Option<Challenge>> {
        Ok(self.challenges.get(&id).map(|c| c.clone()))
    }

    async fn list_by_merchant(&self, merchant_id: Uuid) -> Result<Vec<Challenge>> {
        let mut challenges: Vec<Challenge> = self
            .challenges
            .iter()
            .filter(|c| c.merchant_id == merchant_id)
            .map(|c| c.value().clone())
            .collect();
        challenges.sort_by_key(|c| (c.created_at, c.id));
        Ok(challenges)
    }

    async fn create_challenge(&self, challenge: &Challenge) -> Result<()> {
        self.challenges.insert(challenge.id, challenge.clone());
        Ok(())
    }

    async fn update_challenge(
        &self,
        challenge: &Challenge,
        expected_version: i32,
    ) -> Result<bool> {
        let Some(mut current) = self.challenges.get_mut(&challenge.id) else {
            return Ok(false);
        };
        if current.version != expected_version {
            return Ok(false);
        }
        *current = challenge.clone();
        Ok(true)
    }

    async fn set_status(&self, id: Uuid, status: ChallengeStatus) -> Result<bool> {
        let Some(mut current) = self.challenges.get_mut(&id) else {
            return Ok(false);
        };
        current.status = status;
        current.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_challenge(&self, id: Uuid) -> Result<bool> {
        let _guard = self.commit_lock.lock();
        if self.challenge_awarded(id) {
            return Ok(false);
        }
        Ok(self.challenges.remove(&id).is_some())
    }
}

#[async_trait]
impl MerchantSettingsRepositoryTrait for MemoryStore {
    async fn get_settings(&self, merchant_id: Uuid) -> Result<Option<MerchantConfig>> {
        Ok(self.settings.get(&merchant_id).map(|c| c.clone()))
    }

    async fn save_settings(&self, config: &MerchantConfig) -> Result<()> {
        config.validate()?;
        self.settings.insert(config.merchant_id, config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChallengeRule, EntryKind};

    fn entry(customer: &Customer, key: &str, delta: i64) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::now_v7(),
            customer_id: customer.id,
            merchant_id: customer.merchant_id,
            kind: EntryKind::Earn,
            delta,
            balance_after: customer.balance + delta,
            description: None,
            purchase_amount: None,
            idempotency_key: key.to_string(),
            challenge_bonuses: Vec::new(),
            daily_limit_clamp: None,
            operator: None,
            created_at: Utc::now(),
        }
    }

    fn commit_for(customer: &Customer, key: &str, delta: i64) -> LedgerCommit {
        let mut projected = customer.clone();
        projected.balance += delta;
        projected.lifetime_points += delta.max(0);
        LedgerCommit {
            expected_version: customer.version,
            entry: entry(customer, key, delta),
            customer: projected,
            gift_cards: Vec::new(),
            visit: None,
        }
    }

    #[tokio::test]
    async fn test_commit_bumps_version() {
        let store = MemoryStore::new();
        let customer = store
            .create_customer(&Customer::new(Uuid::now_v7(), "5550001", "Ana"))
            .await
            .unwrap();

        let (updated, _) = store
            .commit_append(&commit_for(&customer, "k1", 10))
            .await
            .unwrap();
        assert_eq!(updated.version, customer.version + 1);
        assert_eq!(updated.balance, 10);
        assert_eq!(store.sum_deltas(customer.id).await.unwrap(), (10, 10));
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = MemoryStore::new();
        let customer = store
            .create_customer(&Customer::new(Uuid::now_v7(), "5550002", "Luis"))
            .await
            .unwrap();

        store
            .commit_append(&commit_for(&customer, "k1", 10))
            .await
            .unwrap();
        let err = store
            .commit_append(&commit_for(&customer, "k2", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, RewardsError::ConcurrencyConflict));
        assert_eq!(store.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_visit_does_not_touch_version() {
        let store = MemoryStore::new();
        let customer = store
            .create_customer(&Customer::new(Uuid::now_v7(), "5550003", "Eva"))
            .await
            .unwrap();
        store
            .record_visit(&Visit::new(customer.id, customer.merchant_id, Utc::now()))
            .await
            .unwrap();

        let reloaded = store.get_customer(customer.id).await.unwrap().unwrap();
        assert_eq!(reloaded.visit_count, 1);
        assert_eq!(reloaded.version, customer.version);
    }

    #[tokio::test]
    async fn test_create_customer_returns_existing_phone() {
        let store = MemoryStore::new();
        let merchant = Uuid::now_v7();
        let first = store
            .create_customer(&Customer::new(merchant, "5550004", "Sol"))
            .await
            .unwrap();
        let second = store
            .create_customer(&Customer::new(merchant, "5550004", "Sol"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_transition_status_is_compare_and_set() {
        let store = MemoryStore::new();
        let card = GiftCard {
            id: Uuid::now_v7(),
            customer_id: Uuid::now_v7(),
            merchant_id: Uuid::now_v7(),
            code: "GC-AAAA-BBBB".to_string(),
            value: rust_decimal::Decimal::new(5, 0),
            status: GiftCardStatus::Available,
            milestone: 1,
            issued_at: Utc::now(),
            redeemed_at: None,
            expires_at: None,
            expired_at: None,
        };
        assert_eq!(store.insert_gift_cards(&[card.clone()]).await.unwrap().len(), 1);
        // 同一门槛倍数不会重复写入
        let mut dup = card.clone();
        dup.id = Uuid::now_v7();
        assert!(store.insert_gift_cards(&[dup]).await.unwrap().is_empty());

        let mut redeemed = card.clone();
        redeemed.status = GiftCardStatus::Redeemed;
        redeemed.redeemed_at = Some(Utc::now());
        assert!(store
            .transition_status(&redeemed, GiftCardStatus::Available)
            .await
            .unwrap());
        assert!(!store
            .transition_status(&redeemed, GiftCardStatus::Available)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_keyed_visit_is_recorded_once() {
        let store = MemoryStore::new();
        let customer = store
            .create_customer(&Customer::new(Uuid::now_v7(), "5550005", "Teo"))
            .await
            .unwrap();
        let visit = || {
            Visit::new(customer.id, customer.merchant_id, Utc::now())
                .with_idempotency_key("purchase:T-1")
        };

        assert!(store.record_visit(&visit()).await.unwrap());
        assert!(!store.record_visit(&visit()).await.unwrap());

        let reloaded = store.get_customer(customer.id).await.unwrap().unwrap();
        assert_eq!(reloaded.visit_count, 1);
        assert!(store
            .find_visit_by_key(customer.merchant_id, "purchase:T-1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_commit_writes_visit_with_entry() {
        let store = MemoryStore::new();
        let customer = store
            .create_customer(&Customer::new(Uuid::now_v7(), "5550006", "Iris"))
            .await
            .unwrap();
        let mut commit = commit_for(&customer, "purchase:T-9", 10);
        commit.visit = Some(
            Visit::new(customer.id, customer.merchant_id, Utc::now())
                .with_idempotency_key("purchase:T-9"),
        );

        let (updated, _) = store.commit_append(&commit).await.unwrap();
        assert_eq!(updated.visit_count, 1);
        assert_eq!(updated.balance, 10);
        let visits = store
            .list_visits_since(customer.id, Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(visits.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_visit() {
        let store = MemoryStore::new();
        let customer = store
            .create_customer(&Customer::new(Uuid::now_v7(), "5550007", "Noa"))
            .await
            .unwrap();
        let mut stale = commit_for(&customer, "purchase:T-2", 10);
        stale.expected_version += 1;
        stale.visit = Some(Visit::new(customer.id, customer.merchant_id, Utc::now()));

        assert!(store.commit_append(&stale).await.is_err());
        let reloaded = store.get_customer(customer.id).await.unwrap().unwrap();
        assert_eq!(reloaded.visit_count, 0);
    }

    #[tokio::test]
    async fn test_awarded_challenge_cannot_be_deleted() {
        let store = MemoryStore::new();
        let customer = store
            .create_customer(&Customer::new(Uuid::now_v7(), "5550008", "Gil"))
            .await
            .unwrap();
        let challenge = Challenge::new(
            customer.merchant_id,
            "Big spender",
            ChallengeRule::AmountMin {
                min_amount: rust_decimal::Decimal::new(50, 0),
            },
            25,
        );
        store.create_challenge(&challenge).await.unwrap();

        let mut commit = commit_for(&customer, "purchase:T-3", 25);
        commit.entry.challenge_bonuses = vec![challenge.bonus(25)];
        store.commit_append(&commit).await.unwrap();

        assert!(!store.delete_challenge(challenge.id).await.unwrap());
        assert!(store.get_challenge(challenge.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bonus_for_deleted_challenge_conflicts() {
        let store = MemoryStore::new();
        let customer = store
            .create_customer(&Customer::new(Uuid::now_v7(), "5550009", "Rui"))
            .await
            .unwrap();
        let challenge = Challenge::new(
            customer.merchant_id,
            "Big spender",
            ChallengeRule::AmountMin {
                min_amount: rust_decimal::Decimal::new(50, 0),
            },
            25,
        );
        store.create_challenge(&challenge).await.unwrap();
        let mut commit = commit_for(&customer, "purchase:T-4", 25);
        commit.entry.challenge_bonuses = vec![challenge.bonus(25)];

        assert!(store.delete_challenge(challenge.id).await.unwrap());
        let err = store.commit_append(&commit).await.unwrap_err();
        assert!(matches!(err, RewardsError::ConcurrencyConflict));
        assert_eq!(store.entry_count(), 0);
    }
}
