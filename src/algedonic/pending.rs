use std::{
    collections::HashSet,
    time::Duration,
};

use tokio::{sync::oneshot, time::Instant};

use super::AlgedonicPackage;
use crate::cluster::NodeId;

/// Итог аварийного вещания: определённый исход каждого крика.
///
/// Полный успех — пустой `failed_nodes`; частичный успех — обычный
/// терминальный исход, не ошибка.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreamOutcome {
    pub confirmed_nodes: Vec<NodeId>,
    pub failed_nodes: Vec<NodeId>,
    pub latency: Duration,
}

impl ScreamOutcome {
    /// Исход локальной обработки без известных пиров.
    pub fn local_only() -> Self {
        Self {
            confirmed_nodes: Vec::new(),
            failed_nodes: Vec::new(),
            latency: Duration::ZERO,
        }
    }

    pub fn is_full_success(&self) -> bool {
        self.failed_nodes.is_empty()
    }
}

/// Незавершённый крик: полный набор целей и подтверждённое
/// подмножество.
///
/// Создаётся при старте вещания, мутируется на каждом входящем
/// подтверждении и таймере повтора, уничтожается при полном
/// подтверждении или исчерпании повторов.
pub struct PendingScream {
    /// Пакет крика; нужен для повторных рассылок.
    pub package: AlgedonicPackage,
    pub targets: HashSet<NodeId>,
    pub confirmed: HashSet<NodeId>,
    pub started: Instant,
    pub retries: u32,
    /// Таймаут одной попытки для этого крика.
    pub timeout: Duration,
    reply: Option<oneshot::Sender<ScreamOutcome>>,
}

impl PendingScream {
    pub fn new(
        package: AlgedonicPackage,
        targets: HashSet<NodeId>,
        timeout: Duration,
        reply: oneshot::Sender<ScreamOutcome>,
    ) -> Self {
        Self {
            package,
            targets,
            confirmed: HashSet::new(),
            started: Instant::now(),
            retries: 0,
            timeout,
            reply: Some(reply),
        }
    }

    /// Отмечает подтверждение от узла.
    ///
    /// # Возвращает
    /// - `true`, если узел был целью и ещё не подтверждал
    /// - `false` для чужих и повторных подтверждений
    pub fn confirm(
        &mut self,
        node: NodeId,
    ) -> bool {
        if !self.targets.contains(&node) {
            return false;
        }
        self.confirmed.insert(node)
    }

    /// Подтвердили ли все цели.
    pub fn is_complete(&self) -> bool {
        self.confirmed.len() == self.targets.len()
    }

    /// Узлы, ещё не подтвердившие приём.
    pub fn unconfirmed(&self) -> Vec<NodeId> {
        self.targets.difference(&self.confirmed).cloned().collect()
    }

    /// Разрешает крик и отдаёт исход вызывающему.
    ///
    /// Потребляет ожидателя: повторное разрешение невозможно.
    pub fn resolve(mut self) -> ScreamOutcome {
        let outcome = ScreamOutcome {
            confirmed_nodes: self.confirmed.iter().cloned().collect(),
            failed_nodes: self.unconfirmed(),
            latency: self.started.elapsed(),
        };
        if let Some(reply) = self.reply.take() {
            // Вызывающий мог отменить ожидание — это не ошибка.
            let _ = reply.send(outcome.clone());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::algedonic::AlgedonicSignal;

    fn nodes(names: &[&str]) -> HashSet<NodeId> {
        names.iter().map(|n| NodeId::new(*n)).collect()
    }

    fn package() -> AlgedonicPackage {
        AlgedonicPackage::new(
            NodeId::new("origin"),
            AlgedonicSignal::pain("allocator", 9, json!({})),
        )
    }

    fn timeout() -> Duration {
        Duration::from_millis(500)
    }

    /// Тест проверяет учёт подтверждений и полноту.
    #[tokio::test]
    async fn test_confirmations_reach_completion() {
        let (tx, _rx) = oneshot::channel();
        let mut scream = PendingScream::new(package(), nodes(&["a", "b"]), timeout(), tx);

        assert!(!scream.is_complete());
        assert!(scream.confirm(NodeId::new("a")));
        assert!(!scream.is_complete());
        assert!(scream.confirm(NodeId::new("b")));
        assert!(scream.is_complete());
        assert!(scream.unconfirmed().is_empty());
    }

    /// Тест проверяет, что повторное и чужое подтверждение — no-op.
    #[tokio::test]
    async fn test_duplicate_and_foreign_confirms_are_noops() {
        let (tx, _rx) = oneshot::channel();
        let mut scream = PendingScream::new(package(), nodes(&["a"]), timeout(), tx);

        assert!(scream.confirm(NodeId::new("a")));
        assert!(!scream.confirm(NodeId::new("a")));
        assert!(!scream.confirm(NodeId::new("stranger")));
        assert_eq!(scream.confirmed.len(), 1);
    }

    /// Тест проверяет, что разрешение отдаёт исход в oneshot и
    /// корректно делит узлы на подтверждённые и отказавшие.
    #[tokio::test]
    async fn test_resolve_delivers_partial_outcome() {
        let (tx, rx) = oneshot::channel();
        let mut scream = PendingScream::new(package(), nodes(&["a", "b", "c"]), timeout(), tx);
        scream.confirm(NodeId::new("b"));

        let outcome = scream.resolve();
        assert!(!outcome.is_full_success());
        assert_eq!(outcome.confirmed_nodes, vec![NodeId::new("b")]);
        assert_eq!(outcome.failed_nodes.len(), 2);

        let received = rx.await.unwrap();
        assert_eq!(received, outcome);
    }

    /// Тест проверяет исход без известных пиров.
    #[test]
    fn test_local_only_outcome() {
        let outcome = ScreamOutcome::local_only();
        assert!(outcome.is_full_success());
        assert!(outcome.confirmed_nodes.is_empty());
        assert_eq!(outcome.latency, Duration::ZERO);
    }
}
