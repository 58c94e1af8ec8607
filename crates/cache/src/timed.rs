use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Forma embrulhada do payload de cache para expiração lógica.
///
/// A entrada nunca expira no store; a expiração vive no próprio
/// payload e é imposta pela aplicação. Não misturar com a forma
/// nua (TTL do store) no mesmo namespace de chaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedEntry {
    pub data: serde_json::Value,
    pub expire_at: DateTime<Utc>,
}

impl TimedEntry {
    /// Embrulha um valor com expiração lógica `ttl` a partir de agora.
    pub fn wrap<T: Serialize>(value: &T, ttl: Duration) -> Result<Self, serde_json::Error> {
        Ok(Self {
            data: serde_json::to_value(value)?,
            expire_at: Utc::now() + ttl,
        })
    }

    pub fn is_expired(&self) -> bool {
        self.expire_at <= Utc::now()
    }

    /// Desembrulha o payload de volta ao tipo do domínio.
    pub fn into_inner<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Shop {
        id: u64,
        name: String,
    }

    #[test]
    fn wrap_and_unwrap_round_trip() {
        let shop = Shop {
            id: 7,
            name: "Café da Praça".into(),
        };
        let entry = TimedEntry::wrap(&shop, Duration::from_secs(60)).unwrap();
        assert!(!entry.is_expired());

        let back: Shop = entry.into_inner().unwrap();
        assert_eq!(back, shop);
    }

    #[test]
    fn zero_ttl_is_expired() {
        let entry = TimedEntry::wrap(&1u32, Duration::ZERO).unwrap();
        assert!(entry.is_expired());
    }

    #[test]
    fn serialized_form_is_stable() {
        let shop = Shop {
            id: 7,
            name: "Café".into(),
        };
        let entry = TimedEntry::wrap(&shop, Duration::from_secs(60)).unwrap();

        // Round-trip byte-fiel da forma no fio
        let bytes = serde_json::to_vec(&entry).unwrap();
        let parsed: TimedEntry = serde_json::from_slice(&bytes).unwrap();
        let bytes_again = serde_json::to_vec(&parsed).unwrap();
        assert_eq!(bytes, bytes_again);
    }
}
