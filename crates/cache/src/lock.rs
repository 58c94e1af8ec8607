use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use raio_common::{LOCK_KEY_PREFIX, StoreError};
use raio_store::KvStore;

/// Lock de exclusão mútua entre processos, coordenado pelo store.
///
/// A aquisição é um único set-if-absent com TTL; o TTL garante que um
/// holder que morreu não segura o lock para sempre. A liberação compara
/// o token do dono atomicamente no store — um holder atrasado nunca
/// deleta o lock que outro processo readquiriu.
pub struct DistributedLock<S: ?Sized> {
    store: Arc<S>,
    key: String,
    token: String,
}

impl<S: KvStore + ?Sized> DistributedLock<S> {
    pub fn new(store: Arc<S>, name: &str) -> Self {
        // Token único por tentativa: uuid + identidade do processo
        let token = format!("{}-{}", Uuid::new_v4().simple(), std::process::id());
        Self {
            store,
            key: format!("{LOCK_KEY_PREFIX}{name}"),
            token,
        }
    }

    /// Tenta adquirir o lock uma única vez, sem retry interno.
    /// Retorna `true` sse o store reportou a chave como ausente e ela
    /// agora pertence a esta chamada. Retry/backoff é política do caller.
    pub async fn try_lock(&self, ttl: Duration) -> Result<bool, StoreError> {
        let acquired = self
            .store
            .set_nx(&self.key, Bytes::from(self.token.clone()), Some(ttl))
            .await?;
        if acquired {
            debug!("lock adquirido: {}", self.key);
        }
        Ok(acquired)
    }

    /// Libera o lock se — e somente se — ainda pertence a este holder.
    ///
    /// Mismatch (TTL expirou e outro holder readquiriu) é no-op
    /// silencioso. Falhas do store são logadas e suprimidas: o caminho
    /// de resposta nunca bloqueia numa liberação, o TTL é o backstop.
    pub async fn unlock(&self) {
        match self
            .store
            .del_if_equals(&self.key, self.token.as_bytes())
            .await
        {
            Ok(true) => debug!("lock liberado: {}", self.key),
            Ok(false) => debug!("lock {} já expirado ou de outro holder", self.key),
            Err(e) => warn!("falha ao liberar lock {}: {e} (expira via TTL)", self.key),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
