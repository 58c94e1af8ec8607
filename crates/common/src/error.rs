/// Erros do store chave-valor (colaborador externo).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("operação contra chave com tipo errado")]
    WrongType,
    #[error("valor não é um inteiro válido ou está fora do intervalo")]
    NotAnInteger,
    /// Falha de rede/timeout falando com o store. Nunca deve ser
    /// tratada como "chave não existe".
    #[error("erro transitório no store: {0}")]
    Transient(String),
}

/// Erros da camada cache-aside.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Payload em cache malformado — corrupção, não um miss.
    #[error("payload de cache inválido: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Erro vindo do sistema de registro, propagado sem alteração.
    #[error("erro do loader: {0}")]
    Loader(#[source] anyhow::Error),
    /// Orçamento de retry esgotado sob contenção do lock de rebuild.
    #[error("contenção no lock '{key}' após {attempts} tentativas")]
    LockContention { key: String, attempts: u32 },
}

/// Erros do gerador de IDs distribuído.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// Contador diário excedeu a largura de bits reservada. Fatal para
    /// o par prefixo/dia — nunca é mascarado com wrap-around.
    #[error("contador diário estourou para o prefixo '{prefix}': {count}")]
    SequenceOverflow { prefix: String, count: i64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Erros do fluxo de compra relâmpago.
#[derive(Debug, thiserror::Error)]
pub enum FlashError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Id(#[from] IdError),
    /// A reserva atômica já aconteceu; o pedido precisa ser
    /// reconciliado por um colaborador externo.
    #[error("falha ao persistir pedido {order_id}: {reason}")]
    Persist { order_id: i64, reason: String },
}

/// Erros de submissão ao pool de rebuild.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("fila de rebuild cheia")]
    QueueFull,
    #[error("executor encerrado")]
    Shutdown,
}

/// Erro top-level do Raio.
#[derive(Debug, thiserror::Error)]
pub enum RaioError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Flash(#[from] FlashError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// Result type alias.
pub type RaioResult<T> = Result<T, RaioError>;
