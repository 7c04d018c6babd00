use super::{address_key, Database, Result, StoreError};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// A rental of one node. Times are unix seconds, durations seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Provider address
    pub address: Address,
    pub id: u64,
    /// Node index under the provider
    pub nid: u64,
    /// Renter; recovered from the creating transaction
    pub user: Option<Address>,
    pub activate_time: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub probation: i64,
    pub duration: i64,
}

impl Order {
    pub fn new(
        address: Address,
        id: u64,
        nid: u64,
        user: Option<Address>,
        activate_time: i64,
        probation: i64,
        duration: i64,
    ) -> Self {
        let mut order = Self {
            address,
            id,
            nid,
            user,
            activate_time,
            start_time: 0,
            end_time: 0,
            probation,
            duration,
        };
        order.derive_window();
        order
    }

    /// start = activate + probation, end = start + duration
    fn derive_window(&mut self) {
        self.start_time = self.activate_time.saturating_add(self.probation);
        self.end_time = self.start_time.saturating_add(self.duration);
    }

    /// Whether the order is running at `now` (both bounds exclusive)
    pub fn is_active_at(&self, now: i64) -> bool {
        self.start_time < now && now < self.end_time
    }
}

fn order_prefix(address: &Address) -> String {
    format!("order/{}/", address_key(address))
}

fn order_key(address: &Address, id: u64) -> Vec<u8> {
    format!("{}{:020}", order_prefix(address), id).into_bytes()
}

impl Database {
    /// Store a new order. The window is always re-derived from
    /// activate/probation/duration, and the renter is required.
    pub async fn create_order(&self, order: &Order) -> Result<()> {
        if order.user.is_none() {
            return Err(StoreError::MissingField("user"));
        }
        let mut order = order.clone();
        order.derive_window();
        self.insert_new("order", order_key(&order.address, order.id), &order)
            .await
    }

    pub async fn get_order(&self, address: &Address, id: u64) -> Result<Order> {
        self.read(&order_key(address, id))
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "order",
                key: format!("{:?}/{}", address, id),
            })
    }

    /// Number of orders placed against a provider
    pub async fn order_count(&self, address: &Address) -> Result<u64> {
        let keys = self
            .storage
            .list_keys(order_prefix(address).as_bytes())
            .await?;
        Ok(keys.len() as u64)
    }

    /// Orders with `start < now < end`
    pub async fn list_active_orders(&self, now: i64) -> Result<Vec<Order>> {
        let orders: Vec<Order> = self.scan(b"order/").await?;
        Ok(orders.into_iter().filter(|o| o.is_active_at(now)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    fn order(address: Address, id: u64, activate: i64) -> Order {
        Order::new(address, id, id, Some(Address::repeat_byte(0xee)), activate, 30, 100)
    }

    #[test]
    fn test_window_is_derived() {
        let o = order(Address::zero(), 1, 1_000);
        assert_eq!(o.start_time, 1_030);
        assert_eq!(o.end_time, 1_130);
        assert!(!o.is_active_at(1_030));
        assert!(o.is_active_at(1_031));
        assert!(!o.is_active_at(1_130));
    }

    #[tokio::test]
    async fn test_create_recomputes_window() {
        let db = Database::new(Arc::new(MemoryStorage::new()));
        let mut o = order(Address::repeat_byte(1), 1, 1_000);
        o.start_time = 5;
        o.end_time = 6;

        db.create_order(&o).await.unwrap();
        let stored = db.get_order(&o.address, 1).await.unwrap();
        assert_eq!((stored.start_time, stored.end_time), (1_030, 1_130));
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_user_rejected() {
        let db = Database::new(Arc::new(MemoryStorage::new()));
        let o = order(Address::repeat_byte(1), 1, 1_000);
        db.create_order(&o).await.unwrap();
        assert!(matches!(
            db.create_order(&o).await,
            Err(StoreError::Duplicate { kind: "order", .. })
        ));

        let mut anonymous = order(Address::repeat_byte(1), 2, 1_000);
        anonymous.user = None;
        assert!(matches!(
            db.create_order(&anonymous).await,
            Err(StoreError::MissingField("user"))
        ));
    }

    #[tokio::test]
    async fn test_active_orders_and_count() {
        let db = Database::new(Arc::new(MemoryStorage::new()));
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        db.create_order(&order(a, 1, 0)).await.unwrap(); // 30..130
        db.create_order(&order(a, 2, 200)).await.unwrap(); // 230..330
        db.create_order(&order(b, 1, 50)).await.unwrap(); // 80..180

        let active: Vec<(Address, u64)> = db
            .list_active_orders(100)
            .await
            .unwrap()
            .into_iter()
            .map(|o| (o.address, o.id))
            .collect();
        assert_eq!(active, vec![(a, 1), (b, 1)]);

        assert_eq!(db.order_count(&a).await.unwrap(), 2);
        assert_eq!(db.order_count(&b).await.unwrap(), 1);
        assert_eq!(db.order_count(&Address::zero()).await.unwrap(), 0);
    }
}
