use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Janela de uma promoção relâmpago. Os horários são fixados na
/// criação; o estoque só muda pela rotina atômica de admissão.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub voucher_id: u64,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub stock: i64,
}

impl Promotion {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.begin_time <= now && now < self.end_time
    }
}

/// Pedido criado após a admissão atômica.
///
/// Invariante: para um par `(user_id, voucher_id)` existe no máximo
/// um pedido durante a vida da promoção.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: i64,
    pub user_id: u64,
    pub voucher_id: u64,
}

/// Colaborador externo que persiste pedidos no sistema de registro.
///
/// Semântica at-least-once: a persistência acontece fora da região
/// atômica de admissão e é eventualmente consistente com a reserva.
/// Reconciliação de pedidos admitidos-mas-não-persistidos é
/// responsabilidade de quem implementa.
#[async_trait]
pub trait OrderWriter: Send + Sync {
    async fn persist(&self, order: Order) -> anyhow::Result<()>;
}

/// Writer in-memory para testes.
pub struct MemoryOrderWriter {
    orders: DashMap<i64, Order>,
}

impl MemoryOrderWriter {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn orders_for(&self, voucher_id: u64) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|e| e.voucher_id == voucher_id)
            .map(|e| e.clone())
            .collect()
    }
}

impl Default for MemoryOrderWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderWriter for MemoryOrderWriter {
    async fn persist(&self, order: Order) -> anyhow::Result<()> {
        self.orders.insert(order.order_id, order);
        Ok(())
    }
}
