use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use raio_common::{
    CACHE_KEY_PREFIX, CACHE_NULL_TTL_SECS, CACHE_TTL_SECS, CacheError, LOCK_MAX_RETRIES,
    LOCK_RETRY_INTERVAL_MS, LOCK_TTL_SECS,
};
use raio_store::KvStore;

use crate::executor::RebuildExecutor;
use crate::lock::DistributedLock;
use crate::timed::TimedEntry;

/// Capability de busca no sistema de registro. O cache não decide
/// como o dado é buscado — só quando.
#[async_trait]
pub trait Loader<T>: Send + Sync {
    async fn load(&self, id: &str) -> anyhow::Result<Option<T>>;
}

/// Adapta uma closure `Fn(String) -> Future` em [`Loader`].
pub fn loader_fn<F>(f: F) -> LoaderFn<F> {
    LoaderFn(f)
}

pub struct LoaderFn<F>(F);

#[async_trait]
impl<T, F, Fut> Loader<T> for LoaderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<T>>> + Send,
    T: Send + 'static,
{
    async fn load(&self, id: &str) -> anyhow::Result<Option<T>> {
        (self.0)(id.to_string()).await
    }
}

/// Tuning da camada cache-aside.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL de valores reais (forma nua).
    pub ttl_value: Duration,
    /// TTL curto do marcador negativo.
    pub ttl_negative: Duration,
    /// TTL do lock de rebuild/contenção.
    pub lock_ttl: Duration,
    /// Intervalo entre tentativas na estratégia com mutex.
    pub retry_interval: Duration,
    /// Orçamento de retries sob contenção — limite explícito, nada de
    /// recursão sem teto.
    pub max_retries: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_value: Duration::from_secs(CACHE_TTL_SECS),
            ttl_negative: Duration::from_secs(CACHE_NULL_TTL_SECS),
            lock_ttl: Duration::from_secs(LOCK_TTL_SECS),
            retry_interval: Duration::from_millis(LOCK_RETRY_INTERVAL_MS),
            max_retries: LOCK_MAX_RETRIES,
        }
    }
}

/// Engine cache-aside genérica com três estratégias de consistência,
/// selecionáveis por call site. Todas compartilham a regra de cache
/// negativo: a ausência de um valor também é cacheada.
pub struct CacheClient<S: ?Sized> {
    store: Arc<S>,
    config: CacheConfig,
}

impl<S: KvStore + ?Sized + 'static> CacheClient<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, CacheConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    fn cache_key(entity: &str, id: &str) -> String {
        format!("{CACHE_KEY_PREFIX}{entity}:{id}")
    }

    /// Estratégia pass-through com cache negativo (anti-penetração).
    ///
    /// Miss confirmado pelo marcador negativo retorna `None` sem tocar
    /// o sistema de registro; miss real cai no loader e o resultado —
    /// inclusive a ausência — volta pro store.
    pub async fn get_pass_through<T, L>(
        &self,
        entity: &str,
        id: &str,
        loader: &L,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send,
        L: Loader<T> + ?Sized,
    {
        let key = Self::cache_key(entity, id);

        if let Some(cached) = self.read_cached(&key).await? {
            return Ok(cached.into());
        }
        self.load_and_store(&key, id, loader).await
    }

    /// Estratégia com mutex (anti-breakdown).
    ///
    /// Igual à pass-through, mas o caminho de miss disputa um lock
    /// distribuído antes de chamar o loader, para que uma chave quente
    /// expirada não gere uma manada de reconstruções. Quem perde o
    /// lock dorme e tenta a leitura de novo, dentro de um orçamento
    /// explícito de tentativas.
    pub async fn get_with_mutex<T, L>(
        &self,
        entity: &str,
        id: &str,
        loader: &L,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send,
        L: Loader<T> + ?Sized,
    {
        let key = Self::cache_key(entity, id);
        let lock = DistributedLock::new(self.store.clone(), &key);

        for _attempt in 0..=self.config.max_retries {
            if let Some(cached) = self.read_cached(&key).await? {
                return Ok(cached.into());
            }

            if lock.try_lock(self.config.lock_ttl).await? {
                // Re-checar: outro holder pode ter acabado de popular
                let result = match self.read_cached(&key).await {
                    Ok(Some(cached)) => Ok(cached.into()),
                    Ok(None) => self.load_and_store(&key, id, loader).await,
                    Err(e) => Err(e),
                };
                // Liberação garantida em todos os desfechos
                lock.unlock().await;
                return result;
            }

            tokio::time::sleep(self.config.retry_interval).await;
        }

        Err(CacheError::LockContention {
            key: lock.key().to_string(),
            attempts: self.config.max_retries,
        })
    }

    /// Estratégia de expiração lógica (leituras nunca bloqueiam).
    ///
    /// Miss = nunca cacheado: o namespace é pré-aquecido via
    /// [`preload_logical`](Self::preload_logical), então não há
    /// fallback pro loader. Entrada vencida é devolvida na hora
    /// (staleness limitada) e um único rebuild é disparado no pool —
    /// leitores concorrentes que perderem o lock seguem com o valor
    /// velho, sem trabalho duplicado.
    pub async fn get_logical<T, L>(
        &self,
        entity: &str,
        id: &str,
        loader: Arc<L>,
        executor: &RebuildExecutor,
        logical_ttl: Duration,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        L: Loader<T> + ?Sized + 'static,
    {
        let key = Self::cache_key(entity, id);

        let Some(payload) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let entry: TimedEntry = serde_json::from_slice(&payload)?;
        let expired = entry.is_expired();
        let value: T = entry.into_inner()?;

        if !expired {
            return Ok(Some(value));
        }

        // Vencida: devolve o valor velho já e tenta disparar o rebuild
        let lock = Arc::new(DistributedLock::new(self.store.clone(), &key));
        if lock.try_lock(self.config.lock_ttl).await? {
            let store = self.store.clone();
            let task_lock = lock.clone();
            let task_key = key.clone();
            let id = id.to_string();

            let submitted = executor.try_submit(async move {
                if let Err(e) =
                    rebuild_entry::<S, T, L>(store, &task_key, &id, loader.as_ref(), logical_ttl)
                        .await
                {
                    warn!("rebuild de {task_key} falhou: {e}");
                }
                // Libera em todos os desfechos, inclusive falha
                task_lock.unlock().await;
            });

            if let Err(e) = submitted {
                // Tarefa nunca vai rodar — devolver o lock agora
                warn!("rebuild de {key} rejeitado pelo pool: {e}");
                lock.unlock().await;
            }
        }

        Ok(Some(value))
    }

    /// Pré-aquece uma entrada de expiração lógica (sem TTL no store).
    pub async fn preload_logical<T: Serialize>(
        &self,
        entity: &str,
        id: &str,
        value: &T,
        logical_ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = Self::cache_key(entity, id);
        let entry = TimedEntry::wrap(value, logical_ttl)?;
        let payload = serde_json::to_vec(&entry)?;
        self.store.set(&key, Bytes::from(payload), None).await?;
        Ok(())
    }

    /// Invalida a entrada após atualização no sistema de registro.
    pub async fn invalidate(&self, entity: &str, id: &str) -> Result<(), CacheError> {
        let key = Self::cache_key(entity, id);
        self.store.del(&key).await?;
        debug!("cache invalidado: {key}");
        Ok(())
    }

    /// Lê e classifica uma entrada da forma nua: valor, marcador
    /// negativo ou miss real.
    async fn read_cached<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<Cached<T>>, CacheError> {
        match self.store.get(key).await? {
            // Marcador negativo: ausência confirmada, não toca o loader
            Some(payload) if payload.is_empty() => Ok(Some(Cached::Negative)),
            // Payload corrompido propaga como erro, nunca como miss
            Some(payload) => Ok(Some(Cached::Value(serde_json::from_slice(&payload)?))),
            None => Ok(None),
        }
    }

    async fn load_and_store<T, L>(
        &self,
        key: &str,
        id: &str,
        loader: &L,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + Send,
        L: Loader<T> + ?Sized,
    {
        match loader.load(id).await.map_err(CacheError::Loader)? {
            Some(value) => {
                let payload = serde_json::to_vec(&value)?;
                self.store
                    .set(key, Bytes::from(payload), Some(self.config.ttl_value))
                    .await?;
                Ok(Some(value))
            }
            None => {
                // Cache negativo: ausência vira marcador vazio com TTL curto
                self.store
                    .set(key, Bytes::new(), Some(self.config.ttl_negative))
                    .await?;
                debug!("marcador negativo gravado: {key}");
                Ok(None)
            }
        }
    }
}

/// Resultado classificado de uma leitura da forma nua.
enum Cached<T> {
    Value(T),
    Negative,
}

impl<T> From<Cached<T>> for Option<T> {
    fn from(cached: Cached<T>) -> Self {
        match cached {
            Cached::Value(v) => Some(v),
            Cached::Negative => None,
        }
    }
}

async fn rebuild_entry<S, T, L>(
    store: Arc<S>,
    key: &str,
    id: &str,
    loader: &L,
    logical_ttl: Duration,
) -> Result<(), CacheError>
where
    S: KvStore + ?Sized,
    T: Serialize + DeserializeOwned,
    L: Loader<T> + ?Sized,
{
    match loader.load(id).await.map_err(CacheError::Loader)? {
        Some(value) => {
            let entry = TimedEntry::wrap(&value, logical_ttl)?;
            let payload = serde_json::to_vec(&entry)?;
            store.set(key, Bytes::from(payload), None).await?;
            debug!("cache reconstruído: {key}");
        }
        None => {
            // O valor sumiu do sistema de registro — derruba a entrada
            store.del(key).await?;
            debug!("entrada removida no rebuild (registro vazio): {key}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use raio_store::MemoryStore;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Shop {
        id: u64,
        name: String,
    }

    fn shop(id: u64) -> Shop {
        Shop {
            id,
            name: format!("Loja {id}"),
        }
    }

    /// Loader de teste que conta invocações.
    struct CountingLoader {
        calls: AtomicUsize,
        value: Option<Shop>,
        delay: Duration,
    }

    impl CountingLoader {
        fn some(value: Shop) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                value: Some(value),
                delay: Duration::ZERO,
            }
        }

        fn none() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                value: None,
                delay: Duration::ZERO,
            }
        }

        fn slow(value: Shop, delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                value: Some(value),
                delay,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Loader<Shop> for CountingLoader {
        async fn load(&self, _id: &str) -> anyhow::Result<Option<Shop>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.value.clone())
        }
    }

    #[tokio::test]
    async fn pass_through_miss_then_hit() {
        let store = Arc::new(MemoryStore::new());
        let client = CacheClient::new(store);
        let loader = CountingLoader::some(shop(1));

        let first: Option<Shop> = client.get_pass_through("shop", "1", &loader).await.unwrap();
        assert_eq!(first, Some(shop(1)));
        assert_eq!(loader.calls(), 1);

        // Segunda leitura vem do cache
        let second: Option<Shop> = client.get_pass_through("shop", "1", &loader).await.unwrap();
        assert_eq!(second, Some(shop(1)));
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn negative_cache_blocks_second_lookup() {
        let store = Arc::new(MemoryStore::new());
        let client = CacheClient::new(store);
        let loader = CountingLoader::none();

        let first: Option<Shop> = client.get_pass_through("shop", "404", &loader).await.unwrap();
        assert_eq!(first, None);
        assert_eq!(loader.calls(), 1);

        // O marcador negativo segura a segunda leitura sem tocar o loader
        let second: Option<Shop> = client.get_pass_through("shop", "404", &loader).await.unwrap();
        assert_eq!(second, None);
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn negative_marker_expires() {
        let store = Arc::new(MemoryStore::new());
        let config = CacheConfig {
            ttl_negative: Duration::from_millis(40),
            ..Default::default()
        };
        let client = CacheClient::with_config(store, config);
        let loader = CountingLoader::none();

        let _: Option<Shop> = client.get_pass_through("shop", "404", &loader).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let _: Option<Shop> = client.get_pass_through("shop", "404", &loader).await.unwrap();
        // Marcador expirou, loader consultado de novo
        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test]
    async fn corrupted_payload_is_surfaced() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("cache:shop:1", Bytes::from("{nao-e-json"), None)
            .await
            .unwrap();

        let client = CacheClient::new(store);
        let loader = CountingLoader::some(shop(1));

        let result: Result<Option<Shop>, _> =
            client.get_pass_through("shop", "1", &loader).await;
        // Corrupção nunca vira "não existe"
        assert!(matches!(result, Err(CacheError::Serialization(_))));
        assert_eq!(loader.calls(), 0);
    }

    #[tokio::test]
    async fn mutex_strategy_single_loader_call_under_herd() {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(CacheClient::new(store));
        let loader = Arc::new(CountingLoader::slow(shop(1), Duration::from_millis(50)));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let client = client.clone();
            let loader = loader.clone();
            handles.push(tokio::spawn(async move {
                client
                    .get_with_mutex::<Shop, _>("shop", "1", loader.as_ref())
                    .await
                    .unwrap()
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap(), Some(shop(1)));
        }
        // Manada de 16 leitores, uma única ida ao sistema de registro
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn mutex_strategy_bounded_contention() {
        let store = Arc::new(MemoryStore::new());

        // Segura o lock externamente e nunca popula o cache
        let blocker = DistributedLock::new(store.clone(), "cache:shop:1");
        assert!(blocker.try_lock(Duration::from_secs(60)).await.unwrap());

        let config = CacheConfig {
            retry_interval: Duration::from_millis(5),
            max_retries: 3,
            ..Default::default()
        };
        let client = CacheClient::with_config(store, config);
        let loader = CountingLoader::some(shop(1));

        let result: Result<Option<Shop>, _> = client.get_with_mutex("shop", "1", &loader).await;
        assert!(matches!(result, Err(CacheError::LockContention { .. })));
        assert_eq!(loader.calls(), 0);
    }

    #[tokio::test]
    async fn logical_miss_means_not_prewarmed() {
        let store = Arc::new(MemoryStore::new());
        let client = CacheClient::new(store);
        let loader = Arc::new(CountingLoader::some(shop(1)));
        let executor = RebuildExecutor::new(2, 16);

        let result: Option<Shop> = client
            .get_logical("shop", "1", loader.clone(), &executor, Duration::from_secs(60))
            .await
            .unwrap();
        // Nunca cacheado: sem fallback pro loader
        assert_eq!(result, None);
        assert_eq!(loader.calls(), 0);

        executor.shutdown().await;
    }

    #[tokio::test]
    async fn logical_fresh_hit() {
        let store = Arc::new(MemoryStore::new());
        let client = CacheClient::new(store);
        let loader = Arc::new(CountingLoader::some(shop(2)));
        let executor = RebuildExecutor::new(2, 16);

        client
            .preload_logical("shop", "1", &shop(1), Duration::from_secs(60))
            .await
            .unwrap();

        let result: Option<Shop> = client
            .get_logical("shop", "1", loader.clone(), &executor, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(result, Some(shop(1)));
        assert_eq!(loader.calls(), 0);

        executor.shutdown().await;
    }

    #[tokio::test]
    async fn logical_stale_returns_immediately_and_rebuilds_once() {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(CacheClient::new(store.clone()));
        let loader = Arc::new(CountingLoader::slow(shop(99), Duration::from_millis(30)));
        let executor = RebuildExecutor::new(2, 16);

        // Pré-aquece já vencida
        client
            .preload_logical("shop", "1", &shop(1), Duration::ZERO)
            .await
            .unwrap();

        // Vários leitores observam a entrada vencida enquanto o
        // rebuild (lento) está em voo
        let herd_start = Instant::now();
        for _ in 0..8 {
            let value: Option<Shop> = client
                .get_logical("shop", "1", loader.clone(), &executor, Duration::from_secs(60))
                .await
                .unwrap();
            // Todas devolvem o valor velho na hora
            assert_eq!(value, Some(shop(1)));
        }
        // Nenhuma leitura esperou o loader de 30ms
        assert!(herd_start.elapsed() < Duration::from_millis(25));

        // Só um rebuild em voo, mesmo com várias leituras vencidas
        executor.shutdown().await;
        assert_eq!(loader.calls(), 1);

        // Depois do rebuild a entrada está fresca
        let fresh: Option<Shop> = {
            let executor = RebuildExecutor::new(1, 4);
            let v = client
                .get_logical("shop", "1", loader.clone(), &executor, Duration::from_secs(60))
                .await
                .unwrap();
            executor.shutdown().await;
            v
        };
        assert_eq!(fresh, Some(shop(99)));
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let store = Arc::new(MemoryStore::new());
        let client = CacheClient::new(store.clone());
        let loader = CountingLoader::some(shop(1));

        let _: Option<Shop> = client.get_pass_through("shop", "1", &loader).await.unwrap();
        client.invalidate("shop", "1").await.unwrap();

        assert_eq!(store.get("cache:shop:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn bare_shape_round_trip_is_byte_identical() {
        let store = Arc::new(MemoryStore::new());
        let payload = serde_json::to_vec(&shop(7)).unwrap();

        store
            .set("cache:shop:7", Bytes::from(payload.clone()), None)
            .await
            .unwrap();
        let back = store.get("cache:shop:7").await.unwrap().unwrap();
        assert_eq!(back.as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn wrapped_shape_round_trip_is_byte_identical() {
        let store = Arc::new(MemoryStore::new());
        let entry = TimedEntry::wrap(&shop(7), Duration::from_secs(60)).unwrap();
        let payload = serde_json::to_vec(&entry).unwrap();

        store
            .set("cache:shop:7", Bytes::from(payload.clone()), None)
            .await
            .unwrap();
        let back = store.get("cache:shop:7").await.unwrap().unwrap();
        assert_eq!(back.as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn closure_loader_works() {
        let store = Arc::new(MemoryStore::new());
        let client = CacheClient::new(store);

        let loader = loader_fn(|id: String| async move {
            Ok(Some(Shop {
                id: id.parse().unwrap(),
                name: "Fechada".into(),
            }))
        });

        let result: Option<Shop> = client.get_pass_through("shop", "3", &loader).await.unwrap();
        assert_eq!(result.unwrap().id, 3);
    }
}
