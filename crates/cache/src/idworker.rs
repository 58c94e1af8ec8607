use std::sync::Arc;

use chrono::Utc;

use raio_common::{ID_COUNT_BITS, ID_COUNTER_PREFIX, ID_EPOCH_SECS, IdError};
use raio_store::KvStore;

/// Gerador distribuído de IDs de 64 bits, grosseiramente ordenados
/// no tempo.
///
/// Layout: `(segundos desde o epoch fixo) << 32 | contador diário`.
/// O timestamp dá ordenação global grosseira (granularidade de
/// segundo) entre processos; o contador diário — um increment atômico
/// no store, particionado por prefixo e data — dá unicidade sem
/// nenhuma outra coordenação.
pub struct IdWorker<S: ?Sized> {
    store: Arc<S>,
}

impl<S: KvStore + ?Sized> IdWorker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn next_id(&self, prefix: &str) -> Result<i64, IdError> {
        let now = Utc::now();
        let seconds = now.timestamp() - ID_EPOCH_SECS;

        let key = counter_key(prefix, &now.format("%Y:%m:%d").to_string());
        let count = self.store.incr(&key).await?;

        // Estouro do contador é erro explícito, nunca wrap-around
        // silencioso: o bit 33 invadiria o componente de timestamp.
        if count >= 1i64 << ID_COUNT_BITS {
            return Err(IdError::SequenceOverflow {
                prefix: prefix.to_string(),
                count,
            });
        }

        Ok((seconds << ID_COUNT_BITS) | count)
    }
}

fn counter_key(prefix: &str, date: &str) -> String {
    format!("{ID_COUNTER_PREFIX}{prefix}:{date}")
}
