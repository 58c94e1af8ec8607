use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use raio_common::StoreError;

/// Resultado da rotina atômica de admissão da compra relâmpago.
///
/// Os códigos espelham o retorno do script server-side: 0 admitido,
/// 1 sem estoque, 2 pedido repetido do mesmo usuário.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitCode {
    /// Estoque reservado e usuário registrado no conjunto de compradores.
    Admitted,
    /// Estoque esgotado (ou promoção nunca aberta).
    OutOfStock,
    /// Usuário já comprou nesta promoção.
    AlreadyBought,
}

impl AdmitCode {
    pub fn as_u8(self) -> u8 {
        match self {
            AdmitCode::Admitted => 0,
            AdmitCode::OutOfStock => 1,
            AdmitCode::AlreadyBought => 2,
        }
    }
}

/// Interface estreita sobre o store chave-valor compartilhado.
///
/// O store real é um colaborador externo em rede; toda disciplina de
/// concorrência entre processos passa pelos primitivos atômicos daqui
/// (`set_nx`, `incr`, `del_if_equals`, `flash_admit`). Nenhum lock
/// em memória local vale entre processos.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Set condicional: grava apenas se a chave não existe.
    /// Retorna `true` sse a chave estava ausente e agora pertence a
    /// esta chamada.
    async fn set_nx(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    /// Incremento atômico; cria a chave em 0 se não existe.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Equivalente ao script atômico de unlock: compara o valor atual
    /// com `expected` e deleta apenas se forem iguais. Mismatch ou
    /// chave ausente é no-op (`false`), nunca um erro. O check-then-delete
    /// é uma única operação indivisível no store.
    async fn del_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError>;

    /// Equivalente ao script atômico de admissão: valida estoque e
    /// duplicidade, decrementa o estoque e registra o usuário no
    /// conjunto de compradores — tudo numa única operação indivisível.
    async fn flash_admit(
        &self,
        stock_key: &str,
        buyers_key: &str,
        user_id: &str,
    ) -> Result<AdmitCode, StoreError>;
}
