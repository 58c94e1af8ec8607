use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use raio_cache::IdWorker;
use raio_common::{FLASH_BUYERS_PREFIX, FLASH_STOCK_PREFIX, FlashError};
use raio_store::{AdmitCode, KvStore};

use crate::order::{Order, OrderWriter, Promotion};

/// Desfecho de uma tentativa de compra. Rejeições de negócio são
/// resultados válidos e distinguíveis — "esgotou" e "você já comprou"
/// rendem mensagens diferentes pro usuário — nunca erros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// Estoque reservado e pedido persistido.
    Admitted { order_id: i64 },
    /// Estoque esgotado.
    OutOfStock,
    /// Este usuário já comprou nesta promoção.
    AlreadyBought,
}

/// Controle de admissão da compra relâmpago.
///
/// Todo o caminho de elegibilidade — estoque, duplicidade por usuário
/// — mais o decremento roda numa única operação atômica no store:
/// qualquer janela entre "checar" e "reservar" sob carga concorrente
/// venderia além do estoque ou duplicaria pedidos. A persistência
/// durável fica fora da região atômica, com o `OrderWriter`.
///
/// Máquina de estados por `(voucher, user)`:
/// `NoAttempt → Admitted → Persisted` (terminal) ou
/// `NoAttempt → Rejected` (terminal). Estoque reservado nunca volta
/// pro pool por este componente.
pub struct FlashCoordinator<S: ?Sized, W> {
    store: Arc<S>,
    writer: Arc<W>,
    ids: IdWorker<S>,
}

impl<S, W> FlashCoordinator<S, W>
where
    S: KvStore + ?Sized + 'static,
    W: OrderWriter,
{
    pub fn new(store: Arc<S>, writer: Arc<W>) -> Self {
        let ids = IdWorker::new(store.clone());
        Self { store, writer, ids }
    }

    /// Abre a promoção: publica o estoque inicial no store. As chaves
    /// de estoque e compradores não têm TTL — vivem pela promoção.
    pub async fn open_promotion(&self, promotion: &Promotion) -> Result<(), FlashError> {
        let stock_key = stock_key(promotion.voucher_id);
        self.store
            .set(&stock_key, Bytes::from(promotion.stock.to_string()), None)
            .await?;
        debug!(
            "promoção {} aberta com estoque {}",
            promotion.voucher_id, promotion.stock
        );
        Ok(())
    }

    /// Tenta comprar uma unidade para `user_id`.
    ///
    /// A validade da janela é pré-filtrada pelo caller (só promoções
    /// ativas chegam aqui). Admissão atômica primeiro; só depois o id
    /// do pedido é cunhado e o pedido persistido.
    pub async fn attempt_purchase(
        &self,
        voucher_id: u64,
        user_id: u64,
    ) -> Result<PurchaseOutcome, FlashError> {
        let code = self
            .store
            .flash_admit(
                &stock_key(voucher_id),
                &buyers_key(voucher_id),
                &user_id.to_string(),
            )
            .await?;

        match code {
            AdmitCode::OutOfStock => Ok(PurchaseOutcome::OutOfStock),
            AdmitCode::AlreadyBought => Ok(PurchaseOutcome::AlreadyBought),
            AdmitCode::Admitted => {
                let order_id = self.ids.next_id("order").await?;
                let order = Order {
                    order_id,
                    user_id,
                    voucher_id,
                };

                // Fora da região atômica: a reserva já vale; uma falha
                // aqui vira pendência de reconciliação externa, nunca
                // devolução de estoque.
                if let Err(e) = self.writer.persist(order).await {
                    warn!("pedido {order_id} admitido mas não persistido: {e}");
                    return Err(FlashError::Persist {
                        order_id,
                        reason: e.to_string(),
                    });
                }

                Ok(PurchaseOutcome::Admitted { order_id })
            }
        }
    }

    /// Estoque restante da promoção, como visto pelo store.
    pub async fn remaining_stock(&self, voucher_id: u64) -> Result<i64, FlashError> {
        let raw = self.store.get(&stock_key(voucher_id)).await?;
        let Some(data) = raw else { return Ok(0) };
        let s = std::str::from_utf8(&data).map_err(|_| raio_common::StoreError::NotAnInteger)?;
        let n = s
            .parse::<i64>()
            .map_err(|_| raio_common::StoreError::NotAnInteger)?;
        Ok(n)
    }
}

fn stock_key(voucher_id: u64) -> String {
    format!("{FLASH_STOCK_PREFIX}{voucher_id}")
}

fn buyers_key(voucher_id: u64) -> String {
    format!("{FLASH_BUYERS_PREFIX}{voucher_id}")
}
