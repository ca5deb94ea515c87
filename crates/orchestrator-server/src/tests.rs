//! Тесты: доменная модель, конфигурация, каталог на sqlite, HTTP API.

#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::model::{BinlogCoordinates, Instance, InstanceKey};

    // ── Ключи инстансов ──────────────────────────────────────────────────────

    #[test]
    fn test_instance_key_parse_valid() {
        let key: InstanceKey = "db1.example.com:3306".parse().unwrap();
        assert_eq!(key.hostname, "db1.example.com");
        assert_eq!(key.port, 3306);
        assert_eq!(key.to_string(), "db1.example.com:3306");
    }

    #[test]
    fn test_instance_key_invalid_port() {
        for input in ["db1:abc", "db1:0", "db1:99999", "db1"] {
            let result: Result<InstanceKey, _> = input.parse();
            assert!(
                matches!(result, Err(AppError::InputInvalid(_))),
                "ключ {input} должен быть отклонён"
            );
        }
    }

    #[test]
    fn test_instance_key_from_strings() {
        let key = InstanceKey::new_from_strings("db1", "3307").unwrap();
        assert_eq!(key.port, 3307);
        assert!(
            InstanceKey::new_from_strings("", "3306").is_err(),
            "пустой хост должен быть отклонён"
        );
    }

    // ── Координаты бинлога ───────────────────────────────────────────────────

    fn coords(file: &str, pos: i64) -> BinlogCoordinates {
        BinlogCoordinates {
            log_file: file.to_string(),
            log_pos: pos,
        }
    }

    #[test]
    fn test_coordinates_ordering() {
        let a = coords("mysql-bin.000001", 500);
        let b = coords("mysql-bin.000001", 700);
        let c = coords("mysql-bin.000002", 100);

        assert!(a.smaller_than(&b), "позиция упорядочивает внутри файла");
        assert!(b.smaller_than(&c), "файл важнее позиции");
        assert!(a.smaller_than(&c));
        assert!(a.equals(&coords("mysql-bin.000001", 500)));
    }

    #[test]
    fn test_coordinates_trichotomy() {
        let points = [
            coords("mysql-bin.000001", 1),
            coords("mysql-bin.000001", 2),
            coords("mysql-bin.000002", 1),
            coords("mysql-bin.000010", 4),
        ];
        for a in &points {
            for b in &points {
                let relations = [a.smaller_than(b), a.equals(b), b.smaller_than(a)];
                assert_eq!(
                    relations.iter().filter(|r| **r).count(),
                    1,
                    "ровно одно из <, =, > должно выполняться для {a} и {b}"
                );
            }
        }
        // Транзитивность на возрастающей цепочке
        for window in points.windows(2) {
            assert!(window[0].smaller_than(&window[1]));
        }
        assert!(points[0].smaller_than(&points[3]));
    }

    #[test]
    fn test_coordinates_parse() {
        let parsed: BinlogCoordinates = "mysql-bin.000007:1234".parse().unwrap();
        assert_eq!(parsed, coords("mysql-bin.000007", 1234));
        assert!("mysql-bin.000007".parse::<BinlogCoordinates>().is_err());
        assert!("mysql-bin.000007:xyz".parse::<BinlogCoordinates>().is_err());
    }

    // ── Предикаты инстанса ───────────────────────────────────────────────────

    #[test]
    fn test_instance_predicates() {
        let mut instance = Instance::default();
        assert!(!instance.is_slave(), "инстанс без мастера — не реплика");

        instance.master_key = InstanceKey {
            hostname: "m1".to_string(),
            port: 3306,
        };
        assert!(instance.is_slave());
        assert!(!instance.slave_running());

        instance.slave_io_running = true;
        instance.slave_sql_running = true;
        assert!(instance.slave_running());

        instance.read_binlog_coordinates = coords("mysql-bin.000003", 100);
        instance.exec_binlog_coordinates = coords("mysql-bin.000003", 90);
        assert!(!instance.sql_thread_up_to_date());
        instance.exec_binlog_coordinates = coords("mysql-bin.000003", 100);
        assert!(instance.sql_thread_up_to_date());
    }

    #[test]
    fn test_slave_hosts_dedup_and_json() {
        let mut instance = Instance::default();
        let key = InstanceKey {
            hostname: "r1".to_string(),
            port: 3306,
        };
        instance.add_slave_key(key.clone());
        instance.add_slave_key(InstanceKey {
            hostname: "r2".to_string(),
            port: 3306,
        });
        instance.add_slave_key(key);
        assert_eq!(instance.slave_hosts.len(), 2, "дубликат должен быть подавлен");

        let json = instance.slave_hosts_as_json().unwrap();
        let mut restored = Instance::default();
        restored.read_slave_hosts_from_json(&json);
        assert_eq!(restored.slave_hosts, instance.slave_hosts);
    }

    // ── Конфигурация ─────────────────────────────────────────────────────────

    #[test]
    fn test_config_defaults() {
        use crate::config::Config;

        let config = Config::default();
        assert_eq!(config.instance_poll_seconds, 60);
        assert_eq!(config.unseen_instance_forget_hours, 240);
        assert_eq!(config.slave_start_post_wait_milliseconds, 1000);
        assert_eq!(config.discovery_poll_seconds, 5);
        assert_eq!(config.reasonable_replication_lag_seconds, 10);
        assert_eq!(config.reasonable_maintenance_replication_lag_seconds, 20);
        assert_eq!(config.audit_page_size, 20);
        assert!(!config.discover_by_show_slave_hosts);
        assert!(config.http_auth_user.is_empty());
    }

    #[test]
    fn test_config_layer_override() {
        use crate::config::Config;

        let mut config = Config::default();
        config
            .apply_json(r#"{"MySQLTopologyUser": "orc", "InstancePollSeconds": 30}"#)
            .unwrap();
        config
            .apply_json(r#"{"InstancePollSeconds": 10, "HTTPAuthUser": "admin"}"#)
            .unwrap();

        assert_eq!(
            config.mysql_topology_user, "orc",
            "незатронутый ключ сохраняет значение предыдущего слоя"
        );
        assert_eq!(config.instance_poll_seconds, 10, "поздний слой переопределяет ранний");
        assert_eq!(config.http_auth_user, "admin");
        assert_eq!(config.audit_page_size, 20, "нетронутые ключи остаются по умолчанию");
    }

    #[test]
    fn test_config_malformed_is_fatal() {
        use crate::config::Config;

        let mut config = Config::default();
        let result = config.apply_json("{это не json");
        assert!(
            matches!(result, Err(AppError::ConfigFatal(_))),
            "нечитаемый JSON должен быть фатальным"
        );
    }

    #[test]
    fn test_config_validate_requires_credentials() {
        use crate::config::Config;

        let mut config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(AppError::ConfigFatal(_))
        ));

        config.mysql_topology_user = "orc".to_string();
        config.mysql_topology_password = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_backend_db_url() {
        use crate::config::Config;

        let mut config = Config::default();
        assert!(config.backend_db_url().is_none());

        config.mysql_orchestrator_host = "backend.example.com".to_string();
        config.mysql_orchestrator_user = "orc".to_string();
        config.mysql_orchestrator_password = "pw".to_string();
        assert_eq!(
            config.backend_db_url().unwrap(),
            "mysql://orc:pw@backend.example.com:3306/orchestrator"
        );
    }

    // ── Интеграционные тесты: каталог на sqlite и HTTP ───────────────────────

    mod integration {
        use super::*;

        use std::sync::Arc;
        use std::time::Duration;

        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use chrono::Utc;
        use sea_orm::{
            ActiveModelTrait, ActiveValue::Set, Database, DatabaseConnection, EntityTrait,
        };
        use tokio::sync::mpsc;
        use tower::ServiceExt;

        use crate::api::{build_router, AppState};
        use crate::config::Config;
        use crate::services::discovery::DiscoveryQueue;
        use crate::services::topology_probe::TopologyPools;
        use crate::services::{audit_store, instance_store, maintenance_store};
        use orchestrator_entities::database_instance;
        use orchestrator_migration::{Migrator, MigratorTrait};

        async fn test_db() -> DatabaseConnection {
            let db = Database::connect("sqlite::memory:").await.unwrap();
            Migrator::up(&db, None).await.unwrap();
            db
        }

        fn test_config() -> Config {
            Config {
                mysql_topology_user: "orchestrator".to_string(),
                mysql_topology_password: "secret".to_string(),
                ..Config::default()
            }
        }

        /// Здоровая реплика: оба потока работают, лаг нулевой.
        fn make_replica(hostname: &str, port: u16, master: &str, master_port: u16) -> Instance {
            Instance {
                key: InstanceKey {
                    hostname: hostname.to_string(),
                    port,
                },
                server_id: 101,
                version: "5.6.17-log".to_string(),
                binlog_format: "STATEMENT".to_string(),
                log_bin_enabled: true,
                log_slave_updates_enabled: true,
                self_binlog_coordinates: coords("mysql-bin.000010", 1044),
                master_key: InstanceKey {
                    hostname: master.to_string(),
                    port: master_port,
                },
                read_binlog_coordinates: coords("mysql-bin.000222", 5000),
                exec_binlog_coordinates: coords("mysql-bin.000222", 5000),
                slave_io_running: true,
                slave_sql_running: true,
                seconds_behind_master: Some(0),
                slave_lag_seconds: Some(0),
                cluster_name: format!("{master}:{master_port}"),
                ..Default::default()
            }
        }

        fn key(hostname: &str, port: u16) -> InstanceKey {
            InstanceKey {
                hostname: hostname.to_string(),
                port,
            }
        }

        /// Подменить метки времени записи каталога напрямую в таблице.
        async fn backdate(
            db: &DatabaseConnection,
            instance_key: &InstanceKey,
            last_checked: Option<String>,
            last_seen: Option<String>,
        ) {
            let record = database_instance::Entity::find_by_id((
                instance_key.hostname.clone(),
                i32::from(instance_key.port),
            ))
            .one(db)
            .await
            .unwrap()
            .unwrap();
            let mut row: database_instance::ActiveModel = record.into();
            if let Some(ts) = last_checked {
                row.last_checked = Set(ts);
            }
            if let Some(ts) = last_seen {
                row.last_seen = Set(ts);
            }
            row.update(db).await.unwrap();
        }

        fn hours_ago(hours: i64) -> String {
            (Utc::now() - chrono::Duration::hours(hours)).to_rfc3339()
        }

        fn seconds_ago(seconds: i64) -> String {
            (Utc::now() - chrono::Duration::seconds(seconds)).to_rfc3339()
        }

        // ── Каталог ──────────────────────────────────────────────────────────

        #[tokio::test]
        async fn test_write_read_instance_roundtrip() {
            let db = test_db().await;
            let config = test_config();
            let mut replica = make_replica("db1", 3306, "m1", 3306);
            replica.add_slave_key(key("r2", 3306));

            instance_store::write_instance(&db, &replica, None).await.unwrap();

            let read = instance_store::read_instance(&db, &config, &replica.key)
                .await
                .unwrap()
                .expect("инстанс должен найтись после записи");
            assert_eq!(read.key, replica.key);
            assert_eq!(read.server_id, 101);
            assert_eq!(read.master_key, key("m1", 3306));
            assert_eq!(read.exec_binlog_coordinates, coords("mysql-bin.000222", 5000));
            assert_eq!(read.slave_hosts, vec![key("r2", 3306)]);
            assert_eq!(read.cluster_name, "m1:3306");
            assert!(read.is_up_to_date, "только что опрошенный инстанс свеж");
            assert!(read.is_recently_checked);
            assert!(read.is_last_check_valid);
            assert!(read.seconds_since_last_seen.unwrap() <= 5);
        }

        #[tokio::test]
        async fn test_read_absent_instance() {
            let db = test_db().await;
            let config = test_config();
            let absent = instance_store::read_instance(&db, &config, &key("ghost", 3306))
                .await
                .unwrap();
            assert!(absent.is_none(), "несуществующий инстанс не должен найтись");
        }

        #[tokio::test]
        async fn test_write_instance_with_error_skips_last_seen() {
            let db = test_db().await;
            let config = test_config();
            let replica = make_replica("db1", 3306, "m1", 3306);
            let error = AppError::ConnectFailed("учебная ошибка".to_string());

            instance_store::write_instance(&db, &replica, Some(&error)).await.unwrap();

            let read = instance_store::read_instance(&db, &config, &replica.key)
                .await
                .unwrap()
                .unwrap();
            assert!(
                !read.is_last_check_valid,
                "без успешного опроса last_seen не продвигается"
            );
            assert!(read.seconds_since_last_seen.is_none());
        }

        #[tokio::test]
        async fn test_update_last_checked_invalidates_check() {
            let db = test_db().await;
            let config = test_config();
            let replica = make_replica("db1", 3306, "m1", 3306);
            instance_store::write_instance(&db, &replica, None).await.unwrap();

            tokio::time::sleep(Duration::from_millis(5)).await;
            instance_store::update_last_checked(&db, &replica.key).await.unwrap();

            let read = instance_store::read_instance(&db, &config, &replica.key)
                .await
                .unwrap()
                .unwrap();
            assert!(read.is_up_to_date);
            assert!(
                !read.is_last_check_valid,
                "last_checked позже last_seen — последний опрос неуспешен"
            );
        }

        #[tokio::test]
        async fn test_cluster_instances_and_clusters() {
            let db = test_db().await;
            let config = test_config();
            instance_store::write_instance(&db, &make_replica("db2", 3306, "m1", 3306), None)
                .await
                .unwrap();
            instance_store::write_instance(&db, &make_replica("db1", 3306, "m1", 3306), None)
                .await
                .unwrap();
            instance_store::write_instance(&db, &make_replica("db3", 3306, "m2", 3306), None)
                .await
                .unwrap();

            let cluster = instance_store::read_cluster_instances(&db, &config, "m1:3306")
                .await
                .unwrap();
            let hosts: Vec<&str> = cluster.iter().map(|i| i.key.hostname.as_str()).collect();
            assert_eq!(hosts, vec!["db1", "db2"], "кластер упорядочен по хосту");

            let clusters = instance_store::read_clusters(&db).await.unwrap();
            assert_eq!(clusters, vec!["m1:3306".to_string(), "m2:3306".to_string()]);
        }

        #[tokio::test]
        async fn test_search_instances() {
            let db = test_db().await;
            let config = test_config();
            instance_store::write_instance(&db, &make_replica("alpha-db", 3306, "m1", 3306), None)
                .await
                .unwrap();
            instance_store::write_instance(&db, &make_replica("beta-db", 3307, "m1", 3306), None)
                .await
                .unwrap();

            let by_host = instance_store::search_instances(&db, &config, "alpha")
                .await
                .unwrap();
            assert_eq!(by_host.len(), 1);
            assert_eq!(by_host[0].key.hostname, "alpha-db");

            let by_key = instance_store::search_instances(&db, &config, "beta-db:3307")
                .await
                .unwrap();
            assert_eq!(by_key.len(), 1, "поиск по host:port должен найти инстанс");

            let by_port = instance_store::search_instances(&db, &config, "3307")
                .await
                .unwrap();
            assert_eq!(by_port.len(), 1);
        }

        #[tokio::test]
        async fn test_quote_rejected_at_boundary() {
            let db = test_db().await;
            let config = test_config();

            let search = instance_store::search_instances(&db, &config, "x' or '1'='1").await;
            assert!(
                matches!(search, Err(AppError::InputInvalid(_))),
                "строка поиска с кавычкой должна быть отклонена"
            );

            let cluster = instance_store::read_cluster_instances(&db, &config, "bad'name").await;
            assert!(
                matches!(cluster, Err(AppError::InputInvalid(_))),
                "имя кластера с кавычкой должно быть отклонено"
            );
        }

        #[tokio::test]
        async fn test_problem_instances() {
            let db = test_db().await;
            let config = test_config();

            instance_store::write_instance(&db, &make_replica("healthy", 3306, "m1", 3306), None)
                .await
                .unwrap();

            let mut broken = make_replica("broken", 3306, "m1", 3306);
            broken.slave_sql_running = false;
            instance_store::write_instance(&db, &broken, None).await.unwrap();

            let mut lagging = make_replica("lagging", 3306, "m1", 3306);
            lagging.seconds_behind_master = Some(30);
            instance_store::write_instance(&db, &lagging, None).await.unwrap();

            let problems = instance_store::read_problem_instances(&db, &config).await.unwrap();
            let hosts: Vec<&str> = problems.iter().map(|i| i.key.hostname.as_str()).collect();
            assert!(hosts.contains(&"broken"), "остановленный SQL-поток — проблема");
            assert!(hosts.contains(&"lagging"), "лаг выше допустимого — проблема");
            assert!(!hosts.contains(&"healthy"), "здоровая реплика — не проблема");
        }

        #[tokio::test]
        async fn test_outdated_instance_keys() {
            let db = test_db().await;
            let config = test_config();
            let replica = make_replica("db1", 3306, "m1", 3306);
            instance_store::write_instance(&db, &replica, None).await.unwrap();

            let fresh = instance_store::read_outdated_instance_keys(&db, &config)
                .await
                .unwrap();
            assert!(fresh.is_empty(), "свежая запись не устарела");

            backdate(&db, &replica.key, Some(seconds_ago(120)), None).await;
            let outdated = instance_store::read_outdated_instance_keys(&db, &config)
                .await
                .unwrap();
            assert_eq!(outdated, vec![replica.key]);
        }

        #[tokio::test]
        async fn test_forget_instance() {
            let db = test_db().await;
            let config = test_config();
            let replica = make_replica("db1", 3306, "m1", 3306);
            instance_store::write_instance(&db, &replica, None).await.unwrap();

            instance_store::forget_instance(&db, &replica.key).await.unwrap();

            let read = instance_store::read_instance(&db, &config, &replica.key)
                .await
                .unwrap();
            assert!(read.is_none(), "забытый инстанс не должен найтись");

            let audit = audit_store::read_recent_audit(&db, &config, 0).await.unwrap();
            assert!(
                audit.iter().any(|e| e.audit_type == "forget" && e.hostname == "db1"),
                "удаление должно попасть в аудит"
            );
        }

        #[tokio::test]
        async fn test_forget_long_unseen_instances() {
            let db = test_db().await;
            let config = test_config();
            let old = make_replica("ancient", 3306, "m1", 3306);
            let recent = make_replica("recent", 3306, "m1", 3306);
            instance_store::write_instance(&db, &old, None).await.unwrap();
            instance_store::write_instance(&db, &recent, None).await.unwrap();

            // Не виден 300 часов при пороге в 240
            backdate(&db, &old.key, None, Some(hours_ago(300))).await;

            instance_store::forget_long_unseen_instances(&db, &config).await.unwrap();

            assert!(instance_store::read_instance(&db, &config, &old.key)
                .await
                .unwrap()
                .is_none());
            assert!(instance_store::read_instance(&db, &config, &recent.key)
                .await
                .unwrap()
                .is_some());

            let audit = audit_store::read_recent_audit(&db, &config, 0).await.unwrap();
            assert!(
                audit.iter().any(|e| e.audit_type == "forget-unseen"),
                "очистка должна попасть в аудит"
            );
        }

        #[tokio::test]
        async fn test_cluster_name_by_master() {
            let db = test_db().await;

            let mut named = make_replica("m1", 3306, "top", 3306);
            named.cluster_name = "top:3306".to_string();
            instance_store::write_instance(&db, &named, None).await.unwrap();

            let mut unnamed = make_replica("m2", 3306, "top", 3306);
            unnamed.cluster_name = String::new();
            instance_store::write_instance(&db, &unnamed, None).await.unwrap();

            let from_master =
                instance_store::read_cluster_name_by_master(&db, &key("r1", 3306), &key("m1", 3306))
                    .await
                    .unwrap();
            assert_eq!(from_master, "top:3306", "имя кластера берётся у мастера");

            let fallback_master =
                instance_store::read_cluster_name_by_master(&db, &key("r2", 3306), &key("m2", 3306))
                    .await
                    .unwrap();
            assert_eq!(fallback_master, "m2:3306", "пустое имя — host:port мастера");

            let fallback_self =
                instance_store::read_cluster_name_by_master(&db, &key("r3", 3306), &key("nx", 3306))
                    .await
                    .unwrap();
            assert_eq!(fallback_self, "r3:3306", "неизвестный мастер — собственный host:port");
        }

        // ── Обслуживание ─────────────────────────────────────────────────────

        #[tokio::test]
        async fn test_maintenance_exclusivity() {
            let db = test_db().await;
            let target = key("db1", 3306);

            let first = maintenance_store::begin_maintenance(&db, &target, "ops", "upgrade")
                .await
                .unwrap();

            let active = maintenance_store::read_active_maintenance(&db).await.unwrap();
            assert_eq!(active.len(), 1, "ровно одна активная заявка на инстанс");
            assert_eq!(active[0].owner, "ops");

            let second = maintenance_store::begin_maintenance(&db, &target, "ops2", "x").await;
            assert!(
                matches!(second, Err(AppError::InMaintenance(_))),
                "вторая заявка на тот же инстанс должна быть отклонена"
            );

            maintenance_store::end_maintenance(&db, first).await.unwrap();

            let reopened = maintenance_store::begin_maintenance(&db, &target, "ops2", "x")
                .await
                .unwrap();
            assert_ne!(reopened, first, "после закрытия выдаётся новая заявка");
        }

        #[tokio::test]
        async fn test_end_maintenance_errors() {
            let db = test_db().await;
            let target = key("db1", 3306);

            let missing = maintenance_store::end_maintenance(&db, 777).await;
            assert!(matches!(missing, Err(AppError::NotFound(_))));

            let id = maintenance_store::begin_maintenance(&db, &target, "ops", "upgrade")
                .await
                .unwrap();
            maintenance_store::end_maintenance(&db, id).await.unwrap();

            let closed_twice = maintenance_store::end_maintenance(&db, id).await;
            assert!(
                matches!(closed_twice, Err(AppError::NotFound(_))),
                "повторное закрытие — ошибка"
            );

            let by_key = maintenance_store::end_maintenance_by_instance_key(&db, &target).await;
            assert!(matches!(by_key, Err(AppError::NotFound(_))));
        }

        #[tokio::test]
        async fn test_end_maintenance_by_instance_key() {
            let db = test_db().await;
            let target = key("db1", 3306);

            maintenance_store::begin_maintenance(&db, &target, "ops", "upgrade")
                .await
                .unwrap();
            maintenance_store::end_maintenance_by_instance_key(&db, &target)
                .await
                .unwrap();

            let active = maintenance_store::read_active_maintenance(&db).await.unwrap();
            assert!(active.is_empty());
        }

        // ── Аудит ────────────────────────────────────────────────────────────

        #[tokio::test]
        async fn test_audit_pagination_and_order() {
            let db = test_db().await;
            let config = test_config();
            let target = key("db1", 3306);

            for i in 0..25 {
                audit_store::audit_operation(&db, "refresh", Some(&target), &format!("номер {i}"))
                    .await
                    .unwrap();
            }

            let page0 = audit_store::read_recent_audit(&db, &config, 0).await.unwrap();
            let page1 = audit_store::read_recent_audit(&db, &config, 1).await.unwrap();
            assert_eq!(page0.len(), 20, "страница размером AuditPageSize");
            assert_eq!(page1.len(), 5);

            let all: Vec<_> = page0.iter().chain(page1.iter()).collect();
            for window in all.windows(2) {
                assert!(
                    window[0].audit_timestamp >= window[1].audit_timestamp,
                    "журнал убывает по времени и между страницами"
                );
            }
        }

        // ── Очередь обнаружения ──────────────────────────────────────────────

        #[tokio::test]
        async fn test_discovery_queue_dedup() {
            let (queue, mut rx) = DiscoveryQueue::new(10);
            let target = key("db1", 3306);

            queue.submit(target.clone()).await;
            queue.submit(target.clone()).await;

            assert_eq!(rx.try_recv().unwrap(), target);
            assert!(
                rx.try_recv().is_err(),
                "повторная заявка на ожидающий ключ подавляется"
            );
        }

        // ── HTTP API ─────────────────────────────────────────────────────────

        struct TestApp {
            app: axum::Router,
            db: DatabaseConnection,
            _discovery_rx: mpsc::Receiver<InstanceKey>,
        }

        async fn build_test_app_with(config: Config) -> TestApp {
            let db = test_db().await;
            let config = Arc::new(config);
            let pools = Arc::new(TopologyPools::new(&config));
            let (discovery, rx) = DiscoveryQueue::new(10);
            let state = AppState {
                db: db.clone(),
                config,
                pools,
                discovery,
            };
            TestApp {
                app: build_router(state),
                db,
                _discovery_rx: rx,
            }
        }

        async fn build_test_app() -> TestApp {
            build_test_app_with(test_config()).await
        }

        async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
            (status, value)
        }

        #[tokio::test]
        async fn test_health_check() {
            let test_app = build_test_app().await;
            let (status, body) = get_json(&test_app.app, "/health").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "ok");
        }

        #[tokio::test]
        async fn test_instance_not_found_envelope() {
            let test_app = build_test_app().await;
            let (status, body) = get_json(&test_app.app, "/api/instance/ghost/3306").await;
            assert_eq!(status, StatusCode::OK, "ошибки отдаются с HTTP 200");
            assert_eq!(body["Code"], "ERROR");
            assert!(body["Message"].as_str().unwrap().contains("ghost"));
        }

        #[tokio::test]
        async fn test_instance_invalid_port_envelope() {
            let test_app = build_test_app().await;
            let (status, body) = get_json(&test_app.app, "/api/instance/db1/99999").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["Code"], "ERROR");
        }

        #[tokio::test]
        async fn test_instance_payload() {
            let test_app = build_test_app().await;
            instance_store::write_instance(&test_app.db, &make_replica("db1", 3306, "m1", 3306), None)
                .await
                .unwrap();

            let (status, body) = get_json(&test_app.app, "/api/instance/db1/3306").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["key"]["hostname"], "db1");
            assert_eq!(body["masterKey"]["hostname"], "m1");
            assert_eq!(body["clusterName"], "m1:3306");
        }

        #[tokio::test]
        async fn test_discover_returns_ok_envelope() {
            let test_app = build_test_app().await;
            let (status, body) = get_json(&test_app.app, "/api/discover/db1/3306").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["Code"], "OK");
        }

        #[tokio::test]
        async fn test_maintenance_over_http() {
            let test_app = build_test_app().await;

            let (_, began) =
                get_json(&test_app.app, "/api/begin-maintenance/db1/3306/ops/upgrade").await;
            assert_eq!(began["Code"], "OK");
            let claim_id = began["Details"].as_i64().expect("Details — id заявки");

            let (_, list) = get_json(&test_app.app, "/api/maintenance").await;
            let claims = list.as_array().unwrap();
            assert_eq!(claims.len(), 1);
            assert_eq!(claims[0]["hostname"], "db1");

            let (_, ended) =
                get_json(&test_app.app, &format!("/api/end-maintenance/{claim_id}")).await;
            assert_eq!(ended["Code"], "OK");

            let (_, list) = get_json(&test_app.app, "/api/maintenance").await;
            assert!(list.as_array().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_search_over_http() {
            let test_app = build_test_app().await;
            instance_store::write_instance(&test_app.db, &make_replica("db1", 3306, "m1", 3306), None)
                .await
                .unwrap();

            let (_, found) = get_json(&test_app.app, "/api/search?s=db1").await;
            assert_eq!(found.as_array().unwrap().len(), 1);

            let (_, by_path) = get_json(&test_app.app, "/api/search/db1").await;
            assert_eq!(by_path.as_array().unwrap().len(), 1);
        }

        #[tokio::test]
        async fn test_audit_over_http() {
            let test_app = build_test_app().await;
            let replica = make_replica("db1", 3306, "m1", 3306);
            instance_store::write_instance(&test_app.db, &replica, None)
                .await
                .unwrap();
            instance_store::forget_instance(&test_app.db, &replica.key)
                .await
                .unwrap();

            let (_, audit) = get_json(&test_app.app, "/api/audit").await;
            let entries = audit.as_array().unwrap();
            assert!(!entries.is_empty());
            assert!(entries.iter().any(|e| e["auditType"] == "forget"));
        }

        #[tokio::test]
        async fn test_basic_auth() {
            use base64::Engine;

            let config = Config {
                http_auth_user: "admin".to_string(),
                http_auth_password: "s3cret".to_string(),
                ..test_config()
            };
            let test_app = build_test_app_with(config).await;

            let denied = test_app
                .app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/api/clusters")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(
                denied.status(),
                StatusCode::UNAUTHORIZED,
                "без учётных данных доступ к API закрыт"
            );

            let credentials =
                base64::engine::general_purpose::STANDARD.encode("admin:s3cret");
            let allowed = test_app
                .app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/api/clusters")
                        .header("Authorization", format!("Basic {credentials}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(allowed.status(), StatusCode::OK);

            // Liveness-проба остаётся открытой
            let (health_status, _) = get_json(&test_app.app, "/health").await;
            assert_eq!(health_status, StatusCode::OK);
        }
    }
}
