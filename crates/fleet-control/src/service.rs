//! Lifecycle engine implementation.
//!
//! This module provides the `FleetManager` trait and the `FleetService`
//! implementation that coordinates the store, the provisioning fabric and
//! the callback registry.
//!
//! Every mutation is a load, mutate, reconcile, persist sequence on one
//! instance record. Side effects that depend on a mutation (resolving a
//! create callback, asking the fabric to stop) run only after the write
//! succeeded.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use fleet_core::{CallbackId, InstanceId, UserId};
use fleet_provision::{Provisioner, StopOutcome};
use fleet_store::{
    ConnectionInfo, Instance, InstanceQuery, InstanceStatus, Page, PageRequest, Store, StoreError,
};

use crate::callbacks::{CallbackRegistry, CreateCallback, CreateOutcome};
use crate::error::{ControlError, Result};
use crate::events::{
    ConnectionReport, DeploymentStatus, DeploymentStatusReport, InstanceAction,
    InstanceActionReport,
};
use crate::lifecycle;
use crate::location::LocationResolver;
use crate::seats;
use crate::types::{ControlConfig, CreateInstanceRequest, CreateReceipt, JoinInfo};

/// Trait defining the lifecycle operations.
///
/// Client-facing calls and inbound reports may run concurrently against
/// the same instance. Each call reads the record fresh and writes it back
/// whole; the last write wins.
#[async_trait]
pub trait FleetManager: Send + Sync {
    // =========================================================================
    // Client Operations
    // =========================================================================

    /// Request a new instance.
    ///
    /// Returns once the fabric has accepted the deployment. `callback` is
    /// invoked exactly once, later, with the outcome. If this call fails
    /// after the callback was registered, the callback has already been
    /// resolved with `CreateOutcome::Error`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidInput` if no location hint is available,
    /// or the provisioning or storage error that aborted the create.
    async fn create(
        &self,
        request: CreateInstanceRequest,
        callback: CreateCallback,
    ) -> Result<CreateReceipt>;

    /// Get an instance by ID.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InstanceNotFound` if the instance doesn't exist.
    async fn get(&self, instance_id: &InstanceId) -> Result<Instance>;

    /// List instances matching `query`, emptiest and freshest first.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidInput` for a malformed query or cursor.
    async fn list(
        &self,
        query: &str,
        limit: Option<usize>,
        cursor: Option<String>,
    ) -> Result<Page<Instance>>;

    /// Reserve seats on an instance.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InstanceNotFound` if the instance doesn't exist
    /// and `ControlError::SeatLimitReached` if it is full.
    async fn join(&self, instance_id: &InstanceId, user_ids: &[UserId]) -> Result<JoinInfo>;

    /// Overwrite the player count.
    ///
    /// Connection reports are authoritative; this value is advisory and
    /// reconciled against the recorded connections when written.
    async fn update(&self, instance_id: &InstanceId, player_count: i32) -> Result<()>;

    /// Terminate an instance and remove its record.
    ///
    /// A create callback still pending for the record is resolved with
    /// `CreateOutcome::Error`.
    ///
    /// # Errors
    ///
    /// Returns an error if the fabric hard-fails the stop request; the
    /// record is kept in that case.
    async fn delete(&self, instance_id: &InstanceId) -> Result<()>;

    // =========================================================================
    // Inbound Reports
    // =========================================================================

    /// Apply a deployment status report from the fabric.
    async fn handle_deployment_event(&self, report: DeploymentStatusReport) -> Result<Instance>;

    /// Apply a connection report from an instance.
    async fn handle_connection_event(&self, report: ConnectionReport) -> Result<Instance>;

    /// Apply a lifecycle action reported by an instance.
    async fn handle_instance_event(&self, report: InstanceActionReport) -> Result<Instance>;

    /// Deliver a timeout to a pending create callback.
    ///
    /// Returns `false` if the callback had already been resolved.
    fn deliver_timeout(&self, callback_id: &CallbackId, message: String) -> bool;
}

/// The main lifecycle engine implementation.
pub struct FleetService<S: Store> {
    pub(crate) store: Arc<S>,
    pub(crate) provisioner: Arc<dyn Provisioner>,
    locations: Arc<dyn LocationResolver>,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) config: ControlConfig,
}

impl<S: Store> FleetService<S> {
    /// Create a new lifecycle engine.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        provisioner: Arc<dyn Provisioner>,
        locations: Arc<dyn LocationResolver>,
        config: ControlConfig,
    ) -> Self {
        Self {
            store,
            provisioner,
            locations,
            callbacks: CallbackRegistry::new(),
            config,
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(
        store: Arc<S>,
        provisioner: Arc<dyn Provisioner>,
        locations: Arc<dyn LocationResolver>,
    ) -> Self {
        Self::new(store, provisioner, locations, ControlConfig::default())
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the callback registry.
    #[must_use]
    pub const fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    fn load(&self, instance_id: &InstanceId) -> Result<Instance> {
        self.store
            .get_instance(instance_id)?
            .ok_or_else(|| ControlError::InstanceNotFound(instance_id.clone()))
    }

    /// Reconcile derived fields and write the record.
    fn persist(&self, instance: &mut Instance) -> Result<()> {
        seats::reconcile(instance);
        self.store.put_instance(instance)?;
        Ok(())
    }

    /// Move the record towards `reported`. Returns false if the report was
    /// out of order and the status was kept.
    fn transition(instance: &mut Instance, reported: InstanceStatus) -> bool {
        let next = lifecycle::resolve_transition(instance.status, reported);
        let applied = next == reported;
        if applied {
            if next != instance.status && lifecycle::is_faulted(next) {
                tracing::warn!(
                    instance_id = %instance.id,
                    from = %instance.status,
                    to = %next,
                    "Instance status changed"
                );
            } else if next != instance.status {
                tracing::info!(
                    instance_id = %instance.id,
                    from = %instance.status,
                    to = %next,
                    "Instance status changed"
                );
            }
        } else {
            tracing::debug!(
                instance_id = %instance.id,
                current = %instance.status,
                reported = %reported,
                "Ignoring out-of-order status report"
            );
        }
        instance.status = next;
        applied
    }

    fn distinct_users(request: &CreateInstanceRequest) -> Vec<UserId> {
        let mut seen = HashSet::new();
        request
            .user_ids
            .iter()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect()
    }

    /// The part of a create that runs after the callback is registered.
    async fn provision(
        &self,
        request: CreateInstanceRequest,
        user_ids: Vec<UserId>,
        callback_id: CallbackId,
    ) -> Result<Instance> {
        let mut hints = self.locations.resolve(&user_ids).await?;
        if hints.is_empty() {
            hints.extend(request.caller_hint.filter(|h| !h.is_empty()));
        }
        if hints.is_empty() {
            return Err(ControlError::InvalidInput(
                "no location hint available for placement".to_string(),
            ));
        }

        let accepted = self
            .provisioner
            .create_deployment(&hints, &request.metadata)
            .await?;

        let instance_id = InstanceId::new(accepted.request_id.as_str()).map_err(|e| {
            ControlError::DeploymentRejected(format!(
                "unusable request id {:?}: {e}",
                accepted.request_id
            ))
        })?;

        let mut instance = Instance::requested(
            instance_id,
            request.max_players,
            user_ids,
            request.metadata,
            callback_id,
        );
        self.persist(&mut instance)?;

        Ok(instance)
    }
}

#[async_trait]
impl<S: Store + 'static> FleetManager for FleetService<S> {
    // =========================================================================
    // Client Operations
    // =========================================================================

    async fn create(
        &self,
        request: CreateInstanceRequest,
        callback: CreateCallback,
    ) -> Result<CreateReceipt> {
        let user_ids = Self::distinct_users(&request);

        let callback_id = self.callbacks.generate_id();
        self.callbacks.register(callback_id, callback)?;

        match self.provision(request, user_ids, callback_id).await {
            Ok(instance) => {
                tracing::info!(
                    instance_id = %instance.id,
                    callback_id = %callback_id,
                    max_players = instance.reservation.max_players,
                    reservations = instance.reservation.reservations_count,
                    "Requested instance"
                );
                Ok(CreateReceipt {
                    instance_id: instance.id,
                    callback_id,
                })
            }
            Err(err) => {
                tracing::warn!(callback_id = %callback_id, error = %err, "Create failed");
                self.callbacks
                    .resolve(&callback_id, CreateOutcome::Error(err.to_string()));
                Err(err)
            }
        }
    }

    async fn get(&self, instance_id: &InstanceId) -> Result<Instance> {
        self.load(instance_id)
    }

    async fn list(
        &self,
        query: &str,
        limit: Option<usize>,
        cursor: Option<String>,
    ) -> Result<Page<Instance>> {
        let query = InstanceQuery::parse(query)
            .map_err(|e| ControlError::InvalidInput(e.to_string()))?;
        let page = PageRequest::new(limit, cursor);

        match self.store.query_instances(&query, &page) {
            Ok(page) => Ok(page),
            Err(StoreError::InvalidCursor) => Err(ControlError::InvalidInput(
                "invalid pagination cursor".to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn join(&self, instance_id: &InstanceId, user_ids: &[UserId]) -> Result<JoinInfo> {
        if user_ids.is_empty() {
            return Err(ControlError::InvalidInput(
                "at least one user id is required".to_string(),
            ));
        }

        let mut instance = self.load(instance_id)?;

        if seats::join(&mut instance, user_ids)? {
            self.persist(&mut instance)?;
            tracing::info!(
                instance_id = %instance_id,
                reservations = instance.reservation.reservations_count,
                available_seats = instance.reservation.available_seats,
                "Reserved seats"
            );
        }

        Ok(JoinInfo {
            instance,
            session_info: None,
        })
    }

    async fn update(&self, instance_id: &InstanceId, player_count: i32) -> Result<()> {
        if player_count < 0 {
            return Err(ControlError::InvalidInput(
                "player count cannot be negative".to_string(),
            ));
        }

        let mut instance = self.load(instance_id)?;

        tracing::warn!(
            instance_id = %instance_id,
            player_count,
            connections = instance.reservation.connections.len(),
            "Player count overwritten outside of connection reports"
        );

        instance.player_count = player_count;
        self.persist(&mut instance)
    }

    async fn delete(&self, instance_id: &InstanceId) -> Result<()> {
        match self.provisioner.stop_deployment(instance_id).await? {
            StopOutcome::Stopped { message } => {
                tracing::info!(instance_id = %instance_id, message = %message, "Deployment stopped");
            }
            StopOutcome::AlreadyGone => {
                tracing::info!(instance_id = %instance_id, "Deployment already gone");
            }
        }

        let existing = self.store.get_instance(instance_id)?;
        match existing {
            Some(instance) if self.store.delete_instance(instance_id)? => {
                tracing::info!(instance_id = %instance_id, "Deleted instance");
                self.callbacks.resolve(
                    &instance.reservation.callback_id,
                    CreateOutcome::Error("instance deleted".to_string()),
                );
            }
            _ => tracing::debug!(instance_id = %instance_id, "No local record to delete"),
        }

        Ok(())
    }

    // =========================================================================
    // Inbound Reports
    // =========================================================================

    async fn handle_deployment_event(&self, report: DeploymentStatusReport) -> Result<Instance> {
        let instance_id = report.instance_id()?;
        let mut instance = self.load(&instance_id)?;
        let mut failure = None;

        match report.status() {
            DeploymentStatus::Ready => {
                Self::transition(&mut instance, InstanceStatus::Running);
                match report.ports.get(&self.config.port_name) {
                    Some(port) => {
                        instance.connection_info = Some(ConnectionInfo {
                            ip_address: report.public_ip.clone(),
                            dns_name: report.fqdn.clone(),
                            port: port.external,
                        });
                    }
                    None => tracing::warn!(
                        instance_id = %instance_id,
                        port_name = %self.config.port_name,
                        "Deployment ready without the configured port"
                    ),
                }
            }
            DeploymentStatus::Error => {
                tracing::warn!(
                    instance_id = %instance_id,
                    detail = %report.error_detail,
                    "Deployment failed"
                );
                Self::transition(&mut instance, InstanceStatus::Error);
                failure = Some(if report.error_detail.is_empty() {
                    "deployment failed".to_string()
                } else {
                    format!("deployment failed: {}", report.error_detail)
                });
            }
            DeploymentStatus::Other(raw) => {
                tracing::error!(instance_id = %instance_id, status = %raw, "Unknown deployment status");
                Self::transition(&mut instance, InstanceStatus::Unknown);
                failure = Some(format!("deployment reported status {raw}"));
            }
        }

        self.persist(&mut instance)?;

        if let Some(message) = failure {
            self.callbacks
                .resolve(&instance.reservation.callback_id, CreateOutcome::Error(message));
        }

        Ok(instance)
    }

    async fn handle_connection_event(&self, report: ConnectionReport) -> Result<Instance> {
        let instance_id = report.instance_id()?;
        let connections = report.user_ids()?;
        let mut instance = self.load(&instance_id)?;

        seats::apply_connections(&mut instance.reservation, connections);
        self.persist(&mut instance)?;

        tracing::debug!(
            instance_id = %instance_id,
            player_count = instance.player_count,
            reservations = instance.reservation.reservations_count,
            "Applied connection report"
        );

        Ok(instance)
    }

    async fn handle_instance_event(&self, report: InstanceActionReport) -> Result<Instance> {
        let instance_id = report.instance_id()?;
        let mut instance = self.load(&instance_id)?;
        let action = report.action();
        let mut ready = false;

        match &action {
            InstanceAction::Ready => {
                tracing::info!(instance_id = %instance_id, message = %report.message, "Instance ready");
                ready = Self::transition(&mut instance, InstanceStatus::Ready);
                if ready {
                    instance.metadata.extend(report.metadata);
                }
            }
            InstanceAction::Stop => {
                tracing::info!(instance_id = %instance_id, message = %report.message, "Instance stopping");
                Self::transition(&mut instance, InstanceStatus::Stopping);
            }
            InstanceAction::Error => {
                tracing::error!(instance_id = %instance_id, message = %report.message, "Instance error");
                Self::transition(&mut instance, InstanceStatus::Error);
            }
            InstanceAction::Other(raw) => {
                tracing::error!(
                    instance_id = %instance_id,
                    action = %raw,
                    message = %report.message,
                    "Unknown instance action"
                );
                Self::transition(&mut instance, InstanceStatus::Unknown);
            }
        }

        self.persist(&mut instance)?;

        match action {
            InstanceAction::Ready if ready => {
                self.callbacks.resolve(
                    &instance.reservation.callback_id,
                    CreateOutcome::Success(Box::new(instance.clone())),
                );
            }
            InstanceAction::Stop => {
                let outcome = self.provisioner.stop_deployment(&instance_id).await?;
                tracing::debug!(instance_id = %instance_id, outcome = ?outcome, "Stop requested");
            }
            InstanceAction::Ready | InstanceAction::Error | InstanceAction::Other(_) => {}
        }

        Ok(instance)
    }

    fn deliver_timeout(&self, callback_id: &CallbackId, message: String) -> bool {
        self.callbacks
            .resolve(callback_id, CreateOutcome::Timeout(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::channel_callback;
    use crate::events::DeploymentPort;
    use crate::location::PlayerDirectory;
    use fleet_provision::MockProvisioner;
    use fleet_store::RocksStore;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// Store whose writes can be switched off mid-test.
    struct FailingStore {
        inner: RocksStore,
        fail_writes: AtomicBool,
    }

    impl FailingStore {
        fn fail_writes(&self) {
            self.fail_writes.store(true, Ordering::SeqCst);
        }
    }

    impl Store for FailingStore {
        fn put_instance(&self, instance: &Instance) -> fleet_store::Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Database("disk full".to_string()));
            }
            self.inner.put_instance(instance)
        }

        fn get_instance(&self, instance_id: &InstanceId) -> fleet_store::Result<Option<Instance>> {
            self.inner.get_instance(instance_id)
        }

        fn delete_instance(&self, instance_id: &InstanceId) -> fleet_store::Result<bool> {
            self.inner.delete_instance(instance_id)
        }

        fn query_instances(
            &self,
            query: &InstanceQuery,
            page: &PageRequest,
        ) -> fleet_store::Result<Page<Instance>> {
            self.inner.query_instances(query, page)
        }

        fn list_all_instances(&self) -> fleet_store::Result<Vec<Instance>> {
            self.inner.list_all_instances()
        }
    }

    struct Harness {
        service: FleetService<RocksStore>,
        provisioner: Arc<MockProvisioner>,
        directory: Arc<PlayerDirectory>,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let provisioner = Arc::new(MockProvisioner::new());
        let directory = Arc::new(PlayerDirectory::new());
        let service = FleetService::with_defaults(store, provisioner.clone(), directory.clone());
        Harness {
            service,
            provisioner,
            directory,
            _dir: dir,
        }
    }

    fn users(names: &[&str]) -> Vec<UserId> {
        names.iter().map(|n| UserId::new(*n).unwrap()).collect()
    }

    fn noop() -> CreateCallback {
        Box::new(|_| {})
    }

    async fn create(h: &Harness, max_players: i32, names: &[&str]) -> CreateReceipt {
        let request =
            CreateInstanceRequest::new(max_players, users(names)).with_caller_hint("192.0.2.10");
        h.service.create(request, noop()).await.unwrap()
    }

    fn ready_report(id: &InstanceId) -> DeploymentStatusReport {
        DeploymentStatusReport {
            request_id: id.to_string(),
            current_status: "Status.READY".to_string(),
            public_ip: "203.0.113.5".to_string(),
            fqdn: "abc.fabric.example".to_string(),
            ports: HashMap::from([(
                "gameport".to_string(),
                DeploymentPort {
                    external: 31000,
                    internal: 7777,
                    ..DeploymentPort::default()
                },
            )]),
            ..DeploymentStatusReport::default()
        }
    }

    #[tokio::test]
    async fn create_persists_requested_instance() {
        let h = harness();
        h.directory.record(UserId::new("a").unwrap(), "198.51.100.1");

        let receipt = create(&h, 4, &["a", "b", "a"]).await;
        let instance = h.service.get(&receipt.instance_id).await.unwrap();

        assert_eq!(instance.status, InstanceStatus::Requested);
        assert_eq!(instance.reservation.reservations, users(&["a", "b"]));
        assert_eq!(instance.reservation.available_seats, 2);
        assert_eq!(instance.reservation.callback_id, receipt.callback_id);
        assert_eq!(
            h.provisioner.location_hints(receipt.instance_id.as_str()),
            Some(vec!["198.51.100.1".to_string()])
        );
        assert!(h.service.callbacks().is_pending(&receipt.callback_id));
    }

    #[tokio::test]
    async fn create_falls_back_to_caller_hint() {
        let h = harness();
        let receipt = create(&h, 2, &["nobody"]).await;
        assert_eq!(
            h.provisioner.location_hints(receipt.instance_id.as_str()),
            Some(vec!["192.0.2.10".to_string()])
        );
    }

    #[tokio::test]
    async fn rejected_create_resolves_error() {
        let h = harness();
        h.provisioner.reject_creates("unknown application version");
        let (handler, rx) = channel_callback();

        let request = CreateInstanceRequest::new(2, users(&["a"])).with_caller_hint("192.0.2.10");
        let err = h.service.create(request, handler).await.unwrap_err();

        assert!(matches!(err, ControlError::DeploymentRejected(_)));
        assert!(matches!(rx.await.unwrap(), CreateOutcome::Error(m) if m.contains("unknown application version")));
        assert_eq!(h.service.callbacks().pending(), 0);
    }

    #[tokio::test]
    async fn create_without_any_hint_resolves_error() {
        let h = harness();
        let (handler, rx) = channel_callback();

        let err = h
            .service
            .create(CreateInstanceRequest::new(2, users(&["a"])), handler)
            .await
            .unwrap_err();

        assert!(matches!(err, ControlError::InvalidInput(_)));
        assert!(matches!(rx.await.unwrap(), CreateOutcome::Error(_)));
        assert_eq!(h.provisioner.deployment_count(), 0);
    }

    #[tokio::test]
    async fn create_records_every_requested_user() {
        let h = harness();
        let receipt = create(&h, 2, &["a", "b", "c"]).await;

        let instance = h.service.get(&receipt.instance_id).await.unwrap();
        assert_eq!(instance.reservation.reservations, users(&["a", "b", "c"]));
        assert_eq!(instance.reservation.reservations_count, 3);
        assert!(matches!(
            h.service.join(&receipt.instance_id, &users(&["d"])).await,
            Err(ControlError::SeatLimitReached { .. })
        ));
    }

    #[tokio::test]
    async fn join_errors_are_distinguishable() {
        let h = harness();
        let receipt = create(&h, 1, &["a"]).await;

        let missing = InstanceId::new("nope").unwrap();
        assert!(matches!(
            h.service.join(&missing, &users(&["b"])).await,
            Err(ControlError::InstanceNotFound(_))
        ));
        assert!(matches!(
            h.service.join(&receipt.instance_id, &users(&["b"])).await,
            Err(ControlError::SeatLimitReached { .. })
        ));
        assert!(matches!(
            h.service.join(&receipt.instance_id, &[]).await,
            Err(ControlError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn deployment_ready_sets_connection_info() {
        let h = harness();
        let receipt = create(&h, 2, &["a"]).await;

        let instance = h
            .service
            .handle_deployment_event(ready_report(&receipt.instance_id))
            .await
            .unwrap();

        assert_eq!(instance.status, InstanceStatus::Running);
        assert_eq!(
            instance.connection_info,
            Some(ConnectionInfo {
                ip_address: "203.0.113.5".to_string(),
                dns_name: "abc.fabric.example".to_string(),
                port: 31000,
            })
        );
        // Readiness is only signalled by the instance itself.
        assert!(h.service.callbacks().is_pending(&receipt.callback_id));
    }

    #[tokio::test]
    async fn late_deployment_ready_keeps_ready_status() {
        let h = harness();
        let receipt = create(&h, 2, &["a"]).await;

        h.service
            .handle_instance_event(InstanceActionReport {
                instance_id: receipt.instance_id.to_string(),
                action: "ready".to_string(),
                ..InstanceActionReport::default()
            })
            .await
            .unwrap();
        let instance = h
            .service
            .handle_deployment_event(ready_report(&receipt.instance_id))
            .await
            .unwrap();

        assert_eq!(instance.status, InstanceStatus::Ready);
        assert!(instance.connection_info.is_some());
    }

    #[tokio::test]
    async fn unknown_deployment_status_resolves_error() {
        let h = harness();
        let (handler, rx) = channel_callback();
        let request = CreateInstanceRequest::new(2, users(&["a"])).with_caller_hint("192.0.2.10");
        let receipt = h.service.create(request, handler).await.unwrap();

        let instance = h
            .service
            .handle_deployment_event(DeploymentStatusReport {
                request_id: receipt.instance_id.to_string(),
                current_status: "Status.TERMINATED".to_string(),
                ..DeploymentStatusReport::default()
            })
            .await
            .unwrap();

        assert_eq!(instance.status, InstanceStatus::Unknown);
        assert!(!h.service.callbacks().is_pending(&receipt.callback_id));
        assert!(matches!(rx.await.unwrap(), CreateOutcome::Error(m) if m.contains("Status.TERMINATED")));
    }

    #[tokio::test]
    async fn ready_after_stopping_is_ignored() {
        let h = harness();
        let receipt = create(&h, 2, &["a"]).await;

        h.service
            .handle_instance_event(InstanceActionReport {
                instance_id: receipt.instance_id.to_string(),
                action: "STOP".to_string(),
                ..InstanceActionReport::default()
            })
            .await
            .unwrap();
        let instance = h
            .service
            .handle_instance_event(InstanceActionReport {
                instance_id: receipt.instance_id.to_string(),
                action: "READY".to_string(),
                metadata: serde_json::Map::from_iter([("mode".to_string(), "duel".into())]),
                ..InstanceActionReport::default()
            })
            .await
            .unwrap();

        assert_eq!(instance.status, InstanceStatus::Stopping);
        assert!(instance.metadata.get("mode").is_none());
        assert!(h.service.callbacks().is_pending(&receipt.callback_id));
    }

    #[tokio::test]
    async fn report_for_unknown_instance_is_surfaced() {
        let h = harness();
        let err = h
            .service
            .handle_connection_event(ConnectionReport {
                instance_id: "ghost".to_string(),
                connections: vec!["a".to_string()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::InstanceNotFound(_)));
    }

    #[tokio::test]
    async fn stop_action_persists_then_stops_deployment() {
        let h = harness();
        let receipt = create(&h, 2, &["a"]).await;

        let instance = h
            .service
            .handle_instance_event(InstanceActionReport {
                instance_id: receipt.instance_id.to_string(),
                action: "STOP".to_string(),
                message: "match over".to_string(),
                ..InstanceActionReport::default()
            })
            .await
            .unwrap();

        assert_eq!(instance.status, InstanceStatus::Stopping);
        assert_eq!(h.provisioner.stopped(), vec![receipt.instance_id.to_string()]);
        // The record stays until it is deleted.
        let stored = h.service.get(&receipt.instance_id).await.unwrap();
        assert_eq!(stored.status, InstanceStatus::Stopping);
    }

    #[tokio::test]
    async fn instance_error_does_not_resolve_callback() {
        let h = harness();
        let receipt = create(&h, 2, &["a"]).await;

        let instance = h
            .service
            .handle_instance_event(InstanceActionReport {
                instance_id: receipt.instance_id.to_string(),
                action: "error".to_string(),
                ..InstanceActionReport::default()
            })
            .await
            .unwrap();

        assert_eq!(instance.status, InstanceStatus::Error);
        assert!(h.service.callbacks().is_pending(&receipt.callback_id));
    }

    #[tokio::test]
    async fn update_is_reconciled_against_connections() {
        let h = harness();
        let receipt = create(&h, 4, &["a"]).await;

        h.service.update(&receipt.instance_id, 3).await.unwrap();
        let instance = h.service.get(&receipt.instance_id).await.unwrap();
        assert_eq!(instance.player_count, 0);

        assert!(matches!(
            h.service.update(&receipt.instance_id, -1).await,
            Err(ControlError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn delete_resolves_pending_callback() {
        let h = harness();
        let (handler, rx) = channel_callback();
        let request = CreateInstanceRequest::new(2, users(&["a"])).with_caller_hint("192.0.2.10");
        let receipt = h.service.create(request, handler).await.unwrap();

        h.service.delete(&receipt.instance_id).await.unwrap();

        assert!(h.service.get(&receipt.instance_id).await.is_err());
        assert!(!h.service.callbacks().is_pending(&receipt.callback_id));
        assert_eq!(h.service.callbacks().pending(), 0);
        assert!(matches!(rx.await.unwrap(), CreateOutcome::Error(m) if m == "instance deleted"));

        // A second delete finds nothing and stays quiet.
        h.service.delete(&receipt.instance_id).await.unwrap();
    }

    #[tokio::test]
    async fn failed_write_skips_dependent_side_effects() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FailingStore {
            inner: RocksStore::open(dir.path()).unwrap(),
            fail_writes: AtomicBool::new(false),
        });
        let provisioner = Arc::new(MockProvisioner::new());
        let service = FleetService::with_defaults(
            store.clone(),
            provisioner.clone(),
            Arc::new(PlayerDirectory::new()),
        );

        let request = CreateInstanceRequest::new(2, users(&["a"])).with_caller_hint("192.0.2.10");
        let receipt = service.create(request, noop()).await.unwrap();
        store.fail_writes();

        let stop = service
            .handle_instance_event(InstanceActionReport {
                instance_id: receipt.instance_id.to_string(),
                action: "STOP".to_string(),
                ..InstanceActionReport::default()
            })
            .await;
        assert!(matches!(stop, Err(ControlError::Store(_))));
        assert!(provisioner.stopped().is_empty());

        let ready = service
            .handle_instance_event(InstanceActionReport {
                instance_id: receipt.instance_id.to_string(),
                action: "READY".to_string(),
                ..InstanceActionReport::default()
            })
            .await;
        assert!(matches!(ready, Err(ControlError::Store(_))));
        assert!(service.callbacks().is_pending(&receipt.callback_id));

        let stored = service.get(&receipt.instance_id).await.unwrap();
        assert_eq!(stored.status, InstanceStatus::Requested);
    }

    #[tokio::test]
    async fn delete_keeps_record_when_stop_fails() {
        let h = harness();
        let receipt = create(&h, 2, &["a"]).await;
        h.provisioner.fail_stops("fabric unavailable");

        assert!(h.service.delete(&receipt.instance_id).await.is_err());
        assert!(h.service.get(&receipt.instance_id).await.is_ok());
    }

    #[tokio::test]
    async fn list_rejects_bad_query_and_cursor() {
        let h = harness();
        assert!(matches!(
            h.service.list("colour:blue", None, None).await,
            Err(ControlError::InvalidInput(_))
        ));
        assert!(matches!(
            h.service.list("", None, Some("zz".to_string())).await,
            Err(ControlError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn deliver_timeout_resolves_once() {
        let h = harness();
        let (handler, rx) = channel_callback();
        let request = CreateInstanceRequest::new(2, users(&["a"])).with_caller_hint("192.0.2.10");
        let receipt = h.service.create(request, handler).await.unwrap();

        assert!(h.service.deliver_timeout(&receipt.callback_id, "waited 30s".into()));
        assert!(!h.service.deliver_timeout(&receipt.callback_id, "again".into()));
        assert!(matches!(rx.await.unwrap(), CreateOutcome::Timeout(_)));
    }
}
