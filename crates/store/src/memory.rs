use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use raio_common::StoreError;

use crate::entry::{Entry, Value};
use crate::kv::{AdmitCode, KvStore};

/// Item no BTreeSet de expiração: (instante, chave).
/// Ordenado por instante para purga eficiente.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
struct ExpiryEntry(Instant, String);

/// Estado compartilhado entre todos os handles.
struct SharedState {
    data: DashMap<String, Entry>,
    expiry: Mutex<BTreeSet<ExpiryEntry>>,
    notify_expiry: Notify,
    /// Seções multi-chave (equivalentes a scripts server-side) rodam
    /// sob este mutex para serem indivisíveis entre si.
    script: Mutex<()>,
}

/// Implementação in-process do [`KvStore`], usada em testes e benches.
///
/// Reproduz a semântica do store externo: TTL imposto pelo próprio
/// store, set-if-absent condicional e as duas rotinas atômicas de
/// script (unlock e admissão).
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<SharedState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let store = MemoryStore {
            shared: Arc::new(SharedState {
                data: DashMap::new(),
                expiry: Mutex::new(BTreeSet::new()),
                notify_expiry: Notify::new(),
                script: Mutex::new(()),
            }),
        };

        // Task de fundo para purgar chaves expiradas
        let shared = store.shared.clone();
        tokio::spawn(async move {
            purge_expired_keys(shared).await;
        });

        store
    }

    /// Registra a expiração de uma chave no índice de purga.
    async fn register_expiry(&self, key: String, when: Instant) {
        let mut expiry = self.shared.expiry.lock().await;
        expiry.insert(ExpiryEntry(when, key));
        drop(expiry);
        self.shared.notify_expiry.notify_one();
    }

    fn read_raw(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let entry = match self.shared.data.get(key) {
            Some(e) => e,
            None => return Ok(None),
        };
        if entry.is_expired() {
            drop(entry);
            self.shared.data.remove(key);
            return Ok(None);
        }
        match &entry.value {
            Value::Raw(data) => Ok(Some(data.clone())),
            Value::Set(_) => Err(StoreError::WrongType),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.read_raw(key)
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.shared
            .data
            .insert(key.to_string(), Entry::new(Value::Raw(value), expires_at));

        if let Some(when) = expires_at {
            self.register_expiry(key.to_string(), when).await;
        }
        Ok(())
    }

    async fn set_nx(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let expires_at = ttl.map(|d| Instant::now() + d);

        // Entry API do DashMap para atomicidade do teste-e-grava
        let acquired = match self.shared.data.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Entry::new(Value::Raw(value), expires_at));
                    true
                } else {
                    false
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(Value::Raw(value), expires_at));
                true
            }
        };

        if acquired && let Some(when) = expires_at {
            self.register_expiry(key.to_string(), when).await;
        }
        Ok(acquired)
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.shared.data.remove(key).is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        // Entry API do DashMap para atomicidade
        let mut entry = self
            .shared
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Raw(Bytes::from("0")), None));

        if entry.is_expired() {
            entry.value = Value::Raw(Bytes::from("0"));
            entry.expires_at = None;
        }

        match &entry.value {
            Value::Raw(data) => {
                let s = std::str::from_utf8(data).map_err(|_| StoreError::NotAnInteger)?;
                let n: i64 = s.parse().map_err(|_| StoreError::NotAnInteger)?;
                let new_val = n.checked_add(1).ok_or(StoreError::NotAnInteger)?;
                entry.value = Value::Raw(Bytes::from(new_val.to_string()));
                Ok(new_val)
            }
            Value::Set(_) => Err(StoreError::WrongType),
        }
    }

    async fn del_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        // remove_if é check-then-delete numa operação só
        let removed = self.shared.data.remove_if(key, |_, entry| {
            !entry.is_expired()
                && matches!(&entry.value, Value::Raw(data) if data.as_ref() == expected)
        });
        Ok(removed.is_some())
    }

    async fn flash_admit(
        &self,
        stock_key: &str,
        buyers_key: &str,
        user_id: &str,
    ) -> Result<AdmitCode, StoreError> {
        // Seção indivisível: nenhum outro script roda entre o check e
        // a reserva.
        let _guard = self.shared.script.lock().await;

        // Duplicidade primeiro: um comprador repetido recebe sempre o
        // mesmo código, mesmo depois do estoque acabar.
        if let Some(entry) = self.shared.data.get(buyers_key)
            && !entry.is_expired()
        {
            match &entry.value {
                Value::Set(members) => {
                    if members.contains(user_id) {
                        return Ok(AdmitCode::AlreadyBought);
                    }
                }
                Value::Raw(_) => return Err(StoreError::WrongType),
            }
        }

        let stock = match self.read_raw(stock_key)? {
            Some(data) => {
                let s = std::str::from_utf8(&data).map_err(|_| StoreError::NotAnInteger)?;
                s.parse::<i64>().map_err(|_| StoreError::NotAnInteger)?
            }
            // Promoção nunca aberta conta como esgotada
            None => return Ok(AdmitCode::OutOfStock),
        };
        if stock <= 0 {
            return Ok(AdmitCode::OutOfStock);
        }

        // Reservar: decrementa estoque e registra comprador
        self.shared.data.insert(
            stock_key.to_string(),
            Entry::new(Value::Raw(Bytes::from((stock - 1).to_string())), None),
        );

        let mut buyers = self
            .shared
            .data
            .entry(buyers_key.to_string())
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new()), None));
        match &mut buyers.value {
            Value::Set(members) => {
                members.insert(user_id.to_string());
            }
            Value::Raw(_) => return Err(StoreError::WrongType),
        }

        Ok(AdmitCode::Admitted)
    }
}

/// Task de fundo que purga chaves expiradas.
async fn purge_expired_keys(shared: Arc<SharedState>) {
    loop {
        let next_expiry = {
            let expiry = shared.expiry.lock().await;
            expiry.iter().next().map(|e| e.0)
        };

        match next_expiry {
            Some(when) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(when) => {}
                    _ = shared.notify_expiry.notified() => { continue; }
                }
            }
            None => {
                shared.notify_expiry.notified().await;
                continue;
            }
        }

        // Purgar todas as chaves que expiraram
        let now = Instant::now();
        let mut expiry = shared.expiry.lock().await;
        let mut to_remove = Vec::new();

        for entry in expiry.iter() {
            if entry.0 <= now {
                to_remove.push(entry.clone());
            } else {
                break; // BTreeSet é ordenado, os próximos são todos futuros
            }
        }

        for entry in &to_remove {
            expiry.remove(entry);
            // Só remove se realmente expirou (pode ter sido re-setado)
            if let Some(e) = shared.data.get(&entry.1)
                && e.is_expired()
            {
                drop(e);
                shared.data.remove(&entry.1);
                debug!("chave expirada removida: {}", entry.1);
            }
        }
    }
}
