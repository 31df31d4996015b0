//! Lifecycle state machine implementation
//!
//! Drives the vendor session/profile protocol: open session, enumerate
//! profiles, load or create, read and write sensitivity, save, subscribe.
//! Each transition's exit action is a command issued toward the bridge;
//! completion is only ever observed through the next event.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::events::{
    CortexCommand, CortexEvent, DataStream, ProfileMode, SensitivityPayload,
};

/// Vendor error code for a profile the current credentials may not touch
pub const ERR_PROFILE_ACCESS_DENIED: i64 = -32046;

/// Steps of the profile lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// Nothing in flight; `start` begins a session
    #[default]
    Idle,
    /// Session open requested
    AwaitingSession,
    /// Profile catalog queried
    AwaitingCatalog,
    /// Load or create requested
    AwaitingLoadOrCreate,
    /// Active-action query in flight
    AwaitingActiveActions,
    /// Sensitivity read in flight
    AwaitingSensitivityRead,
    /// Sensitivity write in flight
    AwaitingSensitivityWrite,
    /// Profile save in flight
    AwaitingSave,
    /// Steady state: the command stream is live
    Subscribed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Idle => "Idle",
            LifecycleState::AwaitingSession => "AwaitingSession",
            LifecycleState::AwaitingCatalog => "AwaitingCatalog",
            LifecycleState::AwaitingLoadOrCreate => "AwaitingLoadOrCreate",
            LifecycleState::AwaitingActiveActions => "AwaitingActiveActions",
            LifecycleState::AwaitingSensitivityRead => "AwaitingSensitivityRead",
            LifecycleState::AwaitingSensitivityWrite => "AwaitingSensitivityWrite",
            LifecycleState::AwaitingSave => "AwaitingSave",
            LifecycleState::Subscribed => "Subscribed",
        };
        f.write_str(name)
    }
}

/// Errors raised locally, before any command is issued
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Session context owned by the controller, never shared or persisted
#[derive(Debug, Default)]
struct SessionContext {
    /// Profile this session is working toward; cleared on unload
    profile: String,
    headset_id: Option<String>,
    state: LifecycleState,
}

/// Event-driven controller for the profile lifecycle
pub struct LifecycleController {
    ctx: SessionContext,
    commands: mpsc::Sender<CortexCommand>,
    /// Sensitivity vector written once the current values have been read
    sensitivity_target: Vec<u8>,
}

impl LifecycleController {
    pub fn new(commands: mpsc::Sender<CortexCommand>, sensitivity_target: Vec<u8>) -> Self {
        Self {
            ctx: SessionContext::default(),
            commands,
            sensitivity_target,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.ctx.state
    }

    /// Profile name this session is working toward; empty after an unload
    pub fn profile(&self) -> &str {
        &self.ctx.profile
    }

    /// Begin the lifecycle: record the wanted profile and open a session.
    ///
    /// Fails locally on an empty profile name; no command is issued in
    /// that case.
    pub async fn start(
        &mut self,
        profile: &str,
        headset_id: Option<String>,
    ) -> Result<(), ControllerError> {
        if profile.is_empty() {
            return Err(ControllerError::InvalidArgument(
                "profile name must not be empty",
            ));
        }

        self.ctx.profile = profile.to_string();
        self.ctx.headset_id = headset_id.clone();

        info!(profile, ?headset_id, "starting live session");
        self.issue(CortexCommand::OpenSession {
            profile_name: profile.to_string(),
            headset_id,
        })
        .await;
        self.transition(LifecycleState::AwaitingSession);
        Ok(())
    }

    /// Dispatch one bridge event against the current state.
    pub async fn handle_event(&mut self, event: CortexEvent) {
        match event {
            CortexEvent::SessionCreated => self.on_session_created().await,
            CortexEvent::CatalogReceived(profiles) => self.on_catalog(profiles).await,
            CortexEvent::LoadUnloadCompleted { is_loaded } => {
                self.on_load_unload(is_loaded).await
            }
            CortexEvent::ActiveActionsReceived(actions) => self.on_active_actions(actions).await,
            CortexEvent::SensitivityReceived(payload) => self.on_sensitivity(payload).await,
            CortexEvent::ProfileSaved => self.on_profile_saved().await,
            CortexEvent::InformError { code, message } => {
                self.on_inform_error(code, &message).await
            }
            // Samples are routed to the smoothing pipeline upstream
            CortexEvent::SampleReceived(_) => {}
        }
    }

    async fn on_session_created(&mut self) {
        if self.ctx.state != LifecycleState::AwaitingSession {
            self.ignore("sessionCreated");
            return;
        }
        self.issue(CortexCommand::QueryProfiles).await;
        self.transition(LifecycleState::AwaitingCatalog);
    }

    /// Exactly one of load or create is issued per catalog.
    async fn on_catalog(&mut self, profiles: Vec<String>) {
        if self.ctx.state != LifecycleState::AwaitingCatalog {
            self.ignore("catalogReceived");
            return;
        }

        let mode = if profiles.iter().any(|p| p == &self.ctx.profile) {
            ProfileMode::Load
        } else {
            ProfileMode::Create
        };
        info!(
            profile = %self.ctx.profile,
            known = profiles.len(),
            ?mode,
            "profile catalog received"
        );

        self.issue(CortexCommand::SetupProfile {
            profile: self.ctx.profile.clone(),
            mode,
        })
        .await;
        self.transition(LifecycleState::AwaitingLoadOrCreate);
    }

    async fn on_load_unload(&mut self, is_loaded: bool) {
        if !is_loaded {
            // An unload completion ends this profile's lifecycle from any state.
            info!(profile = %self.ctx.profile, "profile unloaded");
            self.ctx.profile.clear();
            self.transition(LifecycleState::Idle);
            return;
        }

        if self.ctx.state != LifecycleState::AwaitingLoadOrCreate {
            self.ignore("loadUnloadCompleted");
            return;
        }
        self.issue(CortexCommand::GetActiveActions {
            profile: self.ctx.profile.clone(),
        })
        .await;
        self.transition(LifecycleState::AwaitingActiveActions);
    }

    async fn on_active_actions(&mut self, actions: Vec<String>) {
        if self.ctx.state != LifecycleState::AwaitingActiveActions {
            self.ignore("activeActionsReceived");
            return;
        }
        info!(?actions, "active mental-command actions");
        self.issue(CortexCommand::GetSensitivity {
            profile: self.ctx.profile.clone(),
        })
        .await;
        self.transition(LifecycleState::AwaitingSensitivityRead);
    }

    /// The sensitivity completion event is dual-purpose; dispatch follows
    /// the payload tag, not the awaited step.
    async fn on_sensitivity(&mut self, payload: SensitivityPayload) {
        use LifecycleState::{AwaitingSensitivityRead, AwaitingSensitivityWrite, Subscribed};

        match (self.ctx.state, payload) {
            (AwaitingSensitivityRead | AwaitingSensitivityWrite, SensitivityPayload::Read(values)) => {
                info!(
                    current = ?values,
                    target = ?self.sensitivity_target,
                    "sensitivity read, writing target"
                );
                self.issue(CortexCommand::SetSensitivity {
                    profile: self.ctx.profile.clone(),
                    values: self.sensitivity_target.clone(),
                })
                .await;
                self.transition(AwaitingSensitivityWrite);
            }
            (AwaitingSensitivityRead | AwaitingSensitivityWrite, SensitivityPayload::WriteAck) => {
                self.issue(CortexCommand::SetupProfile {
                    profile: self.ctx.profile.clone(),
                    mode: ProfileMode::Save,
                })
                .await;
                self.transition(LifecycleState::AwaitingSave);
            }
            (Subscribed, SensitivityPayload::Read(values)) => {
                // Operator-initiated query; informational only
                info!(?values, "sensitivity query result");
            }
            (_, _) => self.ignore("sensitivityReceived"),
        }
    }

    async fn on_profile_saved(&mut self) {
        if self.ctx.state != LifecycleState::AwaitingSave {
            self.ignore("profileSaved");
            return;
        }
        info!(profile = %self.ctx.profile, "profile saved, subscribing to command stream");
        self.issue(CortexCommand::Subscribe {
            streams: vec![DataStream::Com],
        })
        .await;
        self.transition(LifecycleState::Subscribed);
    }

    /// Profile-access-denied triggers the disconnect recovery; every other
    /// code leaves the lifecycle stalled where it is, observably.
    async fn on_inform_error(&mut self, code: i64, message: &str) {
        if code == ERR_PROFILE_ACCESS_DENIED {
            warn!(code, message, "profile access denied, disconnecting headset");
            self.issue(CortexCommand::DisconnectHeadset).await;
            self.transition(LifecycleState::Idle);
        } else {
            warn!(code, message, state = %self.ctx.state, "cortex error");
        }
    }

    // Fire-and-forget operations; completion arrives as events.

    pub async fn load_profile(&self, name: &str) {
        self.issue(CortexCommand::SetupProfile {
            profile: name.to_string(),
            mode: ProfileMode::Load,
        })
        .await;
    }

    pub async fn unload_profile(&self, name: &str) {
        self.issue(CortexCommand::SetupProfile {
            profile: name.to_string(),
            mode: ProfileMode::Unload,
        })
        .await;
    }

    pub async fn save_profile(&self, name: &str) {
        self.issue(CortexCommand::SetupProfile {
            profile: name.to_string(),
            mode: ProfileMode::Save,
        })
        .await;
    }

    pub async fn subscribe(&self, streams: Vec<DataStream>) {
        self.issue(CortexCommand::Subscribe { streams }).await;
    }

    pub async fn get_active_actions(&self, name: &str) {
        self.issue(CortexCommand::GetActiveActions {
            profile: name.to_string(),
        })
        .await;
    }

    pub async fn get_sensitivity(&self, name: &str) {
        self.issue(CortexCommand::GetSensitivity {
            profile: name.to_string(),
        })
        .await;
    }

    /// Values pass through unchanged and in order; ordering must match the
    /// most recent active-actions result.
    pub async fn set_sensitivity(&self, name: &str, values: Vec<u8>) {
        self.issue(CortexCommand::SetSensitivity {
            profile: name.to_string(),
            values,
        })
        .await;
    }

    async fn issue(&self, command: CortexCommand) {
        if self.commands.send(command).await.is_err() {
            warn!("command channel closed, dropping command");
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        if next != self.ctx.state {
            info!(from = %self.ctx.state, to = %next, "lifecycle transition");
        }
        self.ctx.state = next;
    }

    fn ignore(&self, event: &str) {
        warn!(event, state = %self.ctx.state, "event does not apply to current state, ignoring");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> (LifecycleController, mpsc::Receiver<CortexCommand>) {
        let (tx, rx) = mpsc::channel(32);
        (LifecycleController::new(tx, vec![5, 5, 7, 7]), rx)
    }

    /// Drive a fresh controller up to the catalog step.
    async fn at_catalog() -> (LifecycleController, mpsc::Receiver<CortexCommand>) {
        let (mut ctl, mut rx) = controller();
        ctl.start("alice", None).await.unwrap();
        rx.try_recv().unwrap(); // OpenSession
        ctl.handle_event(CortexEvent::SessionCreated).await;
        rx.try_recv().unwrap(); // QueryProfiles
        (ctl, rx)
    }

    #[tokio::test]
    async fn start_rejects_empty_profile_name() {
        let (mut ctl, mut rx) = controller();

        let err = ctl.start("", None).await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidArgument(_)));
        assert_eq!(ctl.state(), LifecycleState::Idle);
        assert!(rx.try_recv().is_err(), "no command may be issued");
    }

    #[tokio::test]
    async fn start_opens_session() {
        let (mut ctl, mut rx) = controller();

        ctl.start("alice", Some("EPOCX-1234".into())).await.unwrap();

        assert_eq!(ctl.state(), LifecycleState::AwaitingSession);
        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::OpenSession {
                profile_name: "alice".into(),
                headset_id: Some("EPOCX-1234".into()),
            }
        );
    }

    #[tokio::test]
    async fn session_created_queries_catalog() {
        let (mut ctl, mut rx) = controller();
        ctl.start("alice", None).await.unwrap();
        rx.try_recv().unwrap();

        ctl.handle_event(CortexEvent::SessionCreated).await;

        assert_eq!(ctl.state(), LifecycleState::AwaitingCatalog);
        assert_eq!(rx.try_recv().unwrap(), CortexCommand::QueryProfiles);
    }

    #[tokio::test]
    async fn known_profile_is_loaded_not_created() {
        let (mut ctl, mut rx) = at_catalog().await;

        ctl.handle_event(CortexEvent::CatalogReceived(vec![
            "bob".into(),
            "alice".into(),
        ]))
        .await;

        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::SetupProfile {
                profile: "alice".into(),
                mode: ProfileMode::Load,
            }
        );
        assert!(rx.try_recv().is_err(), "exactly one setup command");
        assert_eq!(ctl.state(), LifecycleState::AwaitingLoadOrCreate);
    }

    #[tokio::test]
    async fn unknown_profile_is_created_not_loaded() {
        let (mut ctl, mut rx) = at_catalog().await;

        ctl.handle_event(CortexEvent::CatalogReceived(vec!["bob".into()]))
            .await;

        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::SetupProfile {
                profile: "alice".into(),
                mode: ProfileMode::Create,
            }
        );
        assert!(rx.try_recv().is_err(), "exactly one setup command");
    }

    #[tokio::test]
    async fn loaded_profile_fetches_active_actions() {
        let (mut ctl, mut rx) = at_catalog().await;
        ctl.handle_event(CortexEvent::CatalogReceived(vec!["alice".into()]))
            .await;
        rx.try_recv().unwrap();

        ctl.handle_event(CortexEvent::LoadUnloadCompleted { is_loaded: true })
            .await;

        assert_eq!(ctl.state(), LifecycleState::AwaitingActiveActions);
        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::GetActiveActions {
                profile: "alice".into(),
            }
        );
    }

    #[tokio::test]
    async fn unload_clears_profile_and_returns_to_idle() {
        let (mut ctl, mut rx) = at_catalog().await;

        ctl.handle_event(CortexEvent::LoadUnloadCompleted { is_loaded: false })
            .await;

        assert_eq!(ctl.state(), LifecycleState::Idle);
        assert_eq!(ctl.profile(), "");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn active_actions_trigger_sensitivity_read() {
        let (mut ctl, mut rx) = at_catalog().await;
        ctl.handle_event(CortexEvent::CatalogReceived(vec!["alice".into()]))
            .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::LoadUnloadCompleted { is_loaded: true })
            .await;
        rx.try_recv().unwrap();

        ctl.handle_event(CortexEvent::ActiveActionsReceived(vec![
            "lift".into(),
            "drop".into(),
        ]))
        .await;

        assert_eq!(ctl.state(), LifecycleState::AwaitingSensitivityRead);
        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::GetSensitivity {
                profile: "alice".into(),
            }
        );
    }

    #[tokio::test]
    async fn sensitivity_read_triggers_ordered_write() {
        let (mut ctl, mut rx) = at_catalog().await;
        ctl.handle_event(CortexEvent::CatalogReceived(vec!["alice".into()]))
            .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::LoadUnloadCompleted { is_loaded: true })
            .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::ActiveActionsReceived(vec!["lift".into()]))
            .await;
        rx.try_recv().unwrap();

        ctl.handle_event(CortexEvent::SensitivityReceived(SensitivityPayload::Read(
            vec![6, 6, 6, 6],
        )))
        .await;

        assert_eq!(ctl.state(), LifecycleState::AwaitingSensitivityWrite);
        // The configured target vector passes through unchanged and in order
        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::SetSensitivity {
                profile: "alice".into(),
                values: vec![5, 5, 7, 7],
            }
        );
    }

    #[tokio::test]
    async fn sensitivity_write_ack_saves_profile() {
        let (mut ctl, mut rx) = at_catalog().await;
        ctl.handle_event(CortexEvent::CatalogReceived(vec!["alice".into()]))
            .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::LoadUnloadCompleted { is_loaded: true })
            .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::ActiveActionsReceived(vec!["lift".into()]))
            .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::SensitivityReceived(SensitivityPayload::Read(
            vec![6, 6, 6, 6],
        )))
        .await;
        rx.try_recv().unwrap();

        ctl.handle_event(CortexEvent::SensitivityReceived(
            SensitivityPayload::WriteAck,
        ))
        .await;

        assert_eq!(ctl.state(), LifecycleState::AwaitingSave);
        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::SetupProfile {
                profile: "alice".into(),
                mode: ProfileMode::Save,
            }
        );
    }

    #[tokio::test]
    async fn saved_profile_subscribes_to_command_stream() {
        let (mut ctl, mut rx) = at_catalog().await;
        ctl.handle_event(CortexEvent::CatalogReceived(vec!["alice".into()]))
            .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::LoadUnloadCompleted { is_loaded: true })
            .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::ActiveActionsReceived(vec!["lift".into()]))
            .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::SensitivityReceived(SensitivityPayload::Read(
            vec![6, 6, 6, 6],
        )))
        .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::SensitivityReceived(
            SensitivityPayload::WriteAck,
        ))
        .await;
        rx.try_recv().unwrap();

        ctl.handle_event(CortexEvent::ProfileSaved).await;

        assert_eq!(ctl.state(), LifecycleState::Subscribed);
        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::Subscribe {
                streams: vec![DataStream::Com],
            }
        );
    }

    #[tokio::test]
    async fn access_denied_disconnects_and_resets() {
        let (mut ctl, mut rx) = at_catalog().await;

        ctl.handle_event(CortexEvent::InformError {
            code: ERR_PROFILE_ACCESS_DENIED,
            message: "profile access denied".into(),
        })
        .await;

        assert_eq!(rx.try_recv().unwrap(), CortexCommand::DisconnectHeadset);
        assert_eq!(ctl.state(), LifecycleState::Idle);
        // The wanted profile survives for an operator restart
        assert_eq!(ctl.profile(), "alice");
    }

    #[tokio::test]
    async fn other_errors_stall_without_recovery() {
        let (mut ctl, mut rx) = at_catalog().await;

        ctl.handle_event(CortexEvent::InformError {
            code: -32001,
            message: "request timed out".into(),
        })
        .await;

        assert!(rx.try_recv().is_err(), "no recovery command");
        assert_eq!(ctl.state(), LifecycleState::AwaitingCatalog);
    }

    #[tokio::test]
    async fn out_of_order_events_are_ignored() {
        let (mut ctl, mut rx) = controller();
        ctl.start("alice", None).await.unwrap();
        rx.try_recv().unwrap();

        // Catalog before the session exists, save before anything was requested
        ctl.handle_event(CortexEvent::CatalogReceived(vec!["alice".into()]))
            .await;
        ctl.handle_event(CortexEvent::ProfileSaved).await;

        assert_eq!(ctl.state(), LifecycleState::AwaitingSession);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn sensitivity_read_while_subscribed_is_informational() {
        let (mut ctl, mut rx) = at_catalog().await;
        ctl.handle_event(CortexEvent::CatalogReceived(vec!["alice".into()]))
            .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::LoadUnloadCompleted { is_loaded: true })
            .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::ActiveActionsReceived(vec!["lift".into()]))
            .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::SensitivityReceived(SensitivityPayload::Read(
            vec![6, 6, 6, 6],
        )))
        .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::SensitivityReceived(
            SensitivityPayload::WriteAck,
        ))
        .await;
        rx.try_recv().unwrap();
        ctl.handle_event(CortexEvent::ProfileSaved).await;
        rx.try_recv().unwrap();
        assert_eq!(ctl.state(), LifecycleState::Subscribed);

        ctl.handle_event(CortexEvent::SensitivityReceived(SensitivityPayload::Read(
            vec![5, 5, 7, 7],
        )))
        .await;

        assert_eq!(ctl.state(), LifecycleState::Subscribed);
        assert!(rx.try_recv().is_err(), "no command for an operator query");
    }

    #[tokio::test]
    async fn fire_and_forget_operations_pass_through() {
        let (ctl, mut rx) = controller();

        ctl.load_profile("alice").await;
        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::SetupProfile {
                profile: "alice".into(),
                mode: ProfileMode::Load,
            }
        );

        ctl.unload_profile("alice").await;
        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::SetupProfile {
                profile: "alice".into(),
                mode: ProfileMode::Unload,
            }
        );

        ctl.save_profile("alice").await;
        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::SetupProfile {
                profile: "alice".into(),
                mode: ProfileMode::Save,
            }
        );

        ctl.subscribe(vec![DataStream::Sys]).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::Subscribe {
                streams: vec![DataStream::Sys],
            }
        );

        ctl.get_active_actions("alice").await;
        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::GetActiveActions {
                profile: "alice".into(),
            }
        );

        ctl.get_sensitivity("alice").await;
        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::GetSensitivity {
                profile: "alice".into(),
            }
        );

        ctl.set_sensitivity("alice", vec![1, 10, 4, 9]).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            CortexCommand::SetSensitivity {
                profile: "alice".into(),
                values: vec![1, 10, 4, 9],
            }
        );
    }
}
