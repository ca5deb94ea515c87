//! Планировщик обнаружения: очередь опросов с дедупликацией, пул воркеров
//! и периодический обход устаревших ключей.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::sync::{mpsc, Mutex};

use crate::config::Config;
use crate::model::InstanceKey;
use crate::services::topology_probe::TopologyPools;
use crate::services::{instance_store, topology_probe};

const QUEUE_CAPACITY: usize = 100;

/// Ручка очереди обнаружения: заявки на опрос инстансов.
#[derive(Clone)]
pub struct DiscoveryQueue {
    tx: mpsc::Sender<InstanceKey>,
    pending: Arc<Mutex<HashSet<InstanceKey>>>,
}

impl DiscoveryQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<InstanceKey>) {
        let (tx, rx) = mpsc::channel(capacity);
        let queue = DiscoveryQueue {
            tx,
            pending: Arc::new(Mutex::new(HashSet::new())),
        };
        (queue, rx)
    }

    /// Поставить ключ в очередь опроса. Заявка на уже ожидающий ключ
    /// подавляется; переполненная очередь — не ошибка, ключ вернётся
    /// следующим обходом устаревших.
    pub async fn submit(&self, key: InstanceKey) {
        {
            let mut pending = self.pending.lock().await;
            if !pending.insert(key.clone()) {
                tracing::debug!("Ключ уже ожидает опроса: {key}");
                return;
            }
        }
        if let Err(e) = self.tx.try_send(key) {
            let key = e.into_inner();
            self.pending.lock().await.remove(&key);
            tracing::warn!("Очередь обнаружения переполнена, пропускаю {key}");
        }
    }

    async fn mark_done(&self, key: &InstanceKey) {
        self.pending.lock().await.remove(key);
    }
}

/// Запустить воркеры опроса и цикл обхода устаревших ключей.
pub fn start(
    db: DatabaseConnection,
    config: Arc<Config>,
    pools: Arc<TopologyPools>,
) -> DiscoveryQueue {
    let (queue, rx) = DiscoveryQueue::new(QUEUE_CAPACITY);
    let rx = Arc::new(Mutex::new(rx));

    for worker_id in 0..config.discovery_workers.max(1) {
        let db = db.clone();
        let config = Arc::clone(&config);
        let pools = Arc::clone(&pools);
        let rx = Arc::clone(&rx);
        let queue = queue.clone();
        tokio::spawn(async move {
            run_worker(worker_id, db, config, pools, rx, queue).await;
        });
    }

    {
        let queue = queue.clone();
        tokio::spawn(async move {
            run_outdated_sweep(db, config, queue).await;
        });
    }

    queue
}

async fn run_worker(
    worker_id: usize,
    db: DatabaseConnection,
    config: Arc<Config>,
    pools: Arc<TopologyPools>,
    rx: Arc<Mutex<mpsc::Receiver<InstanceKey>>>,
    queue: DiscoveryQueue,
) {
    loop {
        // Воркеры разбирают общую очередь по одному ключу за раз
        let key = { rx.lock().await.recv().await };
        let Some(key) = key else {
            tracing::debug!("Очередь обнаружения закрыта, воркер {worker_id} завершается");
            break;
        };
        discover_instance(&db, &config, &pools, &queue, key).await;
    }
}

/// Опросить один ключ и поставить в очередь его ранее не виданные реплики.
/// Сбой опроса логируется и не останавливает обнаружение.
async fn discover_instance(
    db: &DatabaseConnection,
    config: &Arc<Config>,
    pools: &Arc<TopologyPools>,
    queue: &DiscoveryQueue,
    key: InstanceKey,
) {
    // Опрос в отдельной задаче: его паника гасится как JoinError
    let probe = tokio::spawn({
        let db = db.clone();
        let config = Arc::clone(config);
        let pools = Arc::clone(pools);
        let key = key.clone();
        async move { topology_probe::read_topology_instance(&db, &config, &pools, &key).await }
    });
    let result = probe.await;
    queue.mark_done(&key).await;

    let instance = match result {
        Err(join_error) => {
            tracing::error!("Паника при опросе {key}: {join_error}");
            return;
        }
        Ok(Err(e)) => {
            tracing::warn!("Обнаружение {key} не удалось: {e}");
            return;
        }
        Ok(Ok(instance)) => instance,
    };

    for slave_key in &instance.slave_hosts {
        match instance_store::read_instance(db, config, slave_key).await {
            Ok(None) => queue.submit(slave_key.clone()).await,
            Ok(Some(_)) => {}
            Err(e) => tracing::warn!("Не удалось проверить реплику {slave_key}: {e}"),
        }
    }
}

/// Каждые DiscoveryPollSeconds: устаревшие ключи — в очередь, давно не
/// виданные инстансы — забыть.
async fn run_outdated_sweep(db: DatabaseConnection, config: Arc<Config>, queue: DiscoveryQueue) {
    loop {
        tokio::time::sleep(Duration::from_secs(config.discovery_poll_seconds.max(1))).await;

        match instance_store::read_outdated_instance_keys(&db, &config).await {
            Ok(keys) => {
                if !keys.is_empty() {
                    tracing::debug!("Устаревших ключей: {}", keys.len());
                }
                for key in keys {
                    queue.submit(key).await;
                }
            }
            Err(e) => tracing::error!("Ошибка выборки устаревших ключей: {e}"),
        }

        if let Err(e) = instance_store::forget_long_unseen_instances(&db, &config).await {
            tracing::error!("Ошибка очистки давно не виданных инстансов: {e}");
        }
    }
}
