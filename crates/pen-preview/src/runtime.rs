//! Preview runtime
//!
//! A single task owns every piece of mutable preview state: the edit batch,
//! the sequencer, the watchdog and the sandbox host. Everything else talks
//! to it through a [`PreviewHandle`] (commands in) and [`PreviewEvent`]s
//! (broadcast out). Sandboxed contexts reach it only through the
//! [`MessagePort`] given to the host.

use crate::debounce::{Commit, EditDebouncer};
use crate::error::{MessageError, PreviewError};
use crate::instrument::{LoopGuardInstrumenter, ScriptInstrumenter};
use crate::message::{self, BootSignal, InboundMessage, MessagePort};
use crate::sandbox::SandboxHost;
use crate::sequencer::GenerationSequencer;
use crate::synth::{DocumentKind, DocumentSynthesizer, SynthesizedDocument};
use crate::types::{ContextId, FragmentKind, FragmentSet, Generation, PreviewConfig};
use crate::watchdog::{AckOutcome, ExpiryOutcome, Watchdog};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

/// Why an inbound message had no effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Payload is not a known message
    Malformed,
    /// Origin refused by policy
    OriginRejected,
    /// Sent by a context that is no longer live
    StaleContext,
    /// Names a generation that is no longer current
    StaleGeneration,
    /// Current generation has no armed watchdog
    NotArmed,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Malformed => "malformed",
            Self::OriginRejected => "origin rejected",
            Self::StaleContext => "stale context",
            Self::StaleGeneration => "stale generation",
            Self::NotArmed => "not armed",
        };
        f.write_str(label)
    }
}

/// Observable runtime transitions
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewEvent {
    /// Edits committed under a new generation
    Committed {
        /// Generation of the commit
        generation: Generation,
        /// Fragment texts at commit time
        fragments: FragmentSet,
    },
    /// A document is now live
    Rendered {
        /// Generation of the document
        generation: Generation,
        /// Live context
        context: ContextId,
        /// Document kind
        kind: DocumentKind,
    },
    /// The live preview proved it booted
    BootAcknowledged {
        /// Generation that booted
        generation: Generation,
        /// Time from render to boot signal
        latency: Duration,
    },
    /// A message was discarded
    SignalIgnored {
        /// Generation named by the message, if it decoded
        generation: Option<Generation>,
        /// Why it was discarded
        reason: IgnoreReason,
    },
    /// The watchdog killed a preview that never booted
    Killed {
        /// Generation that timed out
        killed: Generation,
        /// Generation of the diagnostic document
        replacement: Generation,
    },
    /// Stop rendered an empty document
    Stopped {
        /// Generation of the empty document
        generation: Generation,
    },
    /// The host could not render; the previous context stays live
    RenderFailed {
        /// Generation that failed
        generation: Generation,
        /// Host-provided reason
        reason: String,
    },
}

/// The live context as last reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderedContext {
    /// Context identity
    pub context: ContextId,
    /// Kind of document in it
    pub kind: DocumentKind,
}

/// Snapshot of runtime state
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewStatus {
    /// Current generation
    pub current: Generation,
    /// Live context, if anything was rendered
    pub rendered: Option<RenderedContext>,
    /// Watchdog timers not yet resolved
    pub armed_watchdogs: usize,
    /// Edits waiting for the quiet period
    pub pending_commit: bool,
    /// Latest buffered fragments
    pub fragments: FragmentSet,
}

#[derive(Debug)]
enum Command {
    Edit { kind: FragmentKind, text: String },
    Load(FragmentSet),
    Clear,
    Flush(oneshot::Sender<Option<Generation>>),
    Refresh(oneshot::Sender<Generation>),
    Stop(oneshot::Sender<Generation>),
    Status(oneshot::Sender<PreviewStatus>),
    Shutdown,
}

/// Handle for driving a running preview
#[derive(Debug, Clone)]
pub struct PreviewHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<PreviewEvent>,
    port: MessagePort,
}

impl PreviewHandle {
    /// Record an edit to one fragment
    pub async fn edit(&self, kind: FragmentKind, text: impl Into<String>) -> Result<(), PreviewError> {
        self.send(Command::Edit {
            kind,
            text: text.into(),
        })
        .await
    }

    /// Replace all fragments, debounced with the first-load interval
    pub async fn load(&self, fragments: FragmentSet) -> Result<(), PreviewError> {
        self.send(Command::Load(fragments)).await
    }

    /// Empty all fragments and schedule a commit
    pub async fn clear(&self) -> Result<(), PreviewError> {
        self.send(Command::Clear).await
    }

    /// Commit pending edits now
    ///
    /// Returns the new generation, or `None` if nothing was pending.
    pub async fn flush(&self) -> Result<Option<Generation>, PreviewError> {
        self.request(Command::Flush).await
    }

    /// Re-render the current buffer under a fresh generation
    pub async fn refresh(&self) -> Result<Generation, PreviewError> {
        self.request(Command::Refresh).await
    }

    /// Replace the preview with an empty document
    pub async fn stop(&self) -> Result<Generation, PreviewError> {
        self.request(Command::Stop).await
    }

    /// Get runtime status
    pub async fn status(&self) -> Result<PreviewStatus, PreviewError> {
        self.request(Command::Status).await
    }

    /// Subscribe to runtime events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.events.subscribe()
    }

    /// Port on which sandboxed contexts post messages
    #[must_use]
    pub fn message_port(&self) -> MessagePort {
        self.port.clone()
    }

    /// Stop the runtime task
    pub async fn shutdown(&self) -> Result<(), PreviewError> {
        self.send(Command::Shutdown).await
    }

    /// Whether the runtime task has exited
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn send(&self, command: Command) -> Result<(), PreviewError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PreviewError::Closed)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, PreviewError> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx)).await?;
        rx.await.map_err(|_| PreviewError::Closed)
    }
}

/// Preview runtime task state
pub struct PreviewRuntime<H: SandboxHost> {
    config: PreviewConfig,
    host: H,
    instrumenter: Box<dyn ScriptInstrumenter>,
    synthesizer: DocumentSynthesizer,
    debouncer: EditDebouncer,
    sequencer: GenerationSequencer,
    watchdog: Watchdog,
    rendered: Option<RenderedContext>,
    events: broadcast::Sender<PreviewEvent>,
}

impl<H: SandboxHost> PreviewRuntime<H> {
    /// Validate `config` and start the runtime on the current tokio runtime
    ///
    /// # Errors
    /// Returns `PreviewError::Config` if the configuration is invalid
    pub fn spawn(config: PreviewConfig, host: H) -> Result<PreviewHandle, PreviewError> {
        Self::spawn_with(config, host, Box::new(LoopGuardInstrumenter::new()))
    }

    /// Start the runtime with a custom script instrumenter
    ///
    /// # Errors
    /// Returns `PreviewError::Config` if the configuration is invalid
    pub fn spawn_with(
        config: PreviewConfig,
        mut host: H,
        instrumenter: Box<dyn ScriptInstrumenter>,
    ) -> Result<PreviewHandle, PreviewError> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let (port, inbound_rx) = message::channel();
        let (watchdog, expiry_rx) = Watchdog::new(config.boot_deadline());

        host.attach(port.clone());

        let runtime = Self {
            debouncer: EditDebouncer::new(config.debounce(), config.first_load_debounce()),
            config,
            host,
            instrumenter,
            synthesizer: DocumentSynthesizer::new(),
            sequencer: GenerationSequencer::new(),
            watchdog,
            rendered: None,
            events: event_tx.clone(),
        };

        tokio::spawn(runtime.run(command_rx, inbound_rx, expiry_rx));
        tracing::info!("Preview runtime started");

        Ok(PreviewHandle {
            commands: command_tx,
            events: event_tx,
            port,
        })
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
        mut expiries: mpsc::UnboundedReceiver<Generation>,
    ) {
        loop {
            let commit_deadline = self.debouncer.deadline();
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(message) = inbound.recv() => self.handle_message(&message),
                Some(generation) = expiries.recv() => self.handle_expiry(generation),
                () = tokio::time::sleep_until(commit_deadline.unwrap_or_else(Instant::now)),
                    if commit_deadline.is_some() =>
                {
                    if let Some(commit) = self.debouncer.poll(Instant::now()) {
                        self.commit(commit);
                    }
                }
            }
        }
        tracing::info!(
            "Preview runtime stopped at generation {}",
            self.sequencer.current()
        );
    }

    fn handle_command(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::Edit { kind, text } => {
                let deadline = self.debouncer.schedule(kind, text, now);
                tracing::trace!("{} edited, commit due at {:?}", kind, deadline);
            }
            Command::Load(fragments) => {
                self.debouncer.load(fragments, now);
                tracing::debug!("Fragments loaded");
            }
            Command::Clear => {
                self.debouncer.clear(now);
                tracing::debug!("Fragments cleared");
            }
            Command::Flush(reply) => {
                let generation = self.debouncer.flush().map(|commit| self.commit(commit));
                let _ = reply.send(generation);
            }
            Command::Refresh(reply) => {
                let commit = self.debouncer.force();
                let _ = reply.send(self.commit(commit));
            }
            Command::Stop(reply) => {
                let _ = reply.send(self.stop());
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown => {}
        }
    }

    fn commit(&mut self, commit: Commit) -> Generation {
        let Commit { fragments, .. } = commit;
        let generation = self.sequencer.next();
        let script = self
            .instrumenter
            .instrument(&fragments.script, self.config.loop_budget());
        let document =
            self.synthesizer
                .synthesize(&fragments.markup, &fragments.style, &script, generation);

        tracing::info!(
            "Committed generation {} ({} loop guards)",
            generation,
            script.guards()
        );
        self.emit(PreviewEvent::Committed {
            generation,
            fragments,
        });
        self.render(&document);
        generation
    }

    fn stop(&mut self) -> Generation {
        let generation = self.sequencer.next();
        tracing::info!("Preview stopped, generation {}", generation);
        self.render(&SynthesizedDocument::blank(generation));
        self.emit(PreviewEvent::Stopped { generation });
        generation
    }

    fn render(&mut self, document: &SynthesizedDocument) {
        let generation = document.generation();
        match self.host.render(document, &self.config.sandbox) {
            Ok(context) => {
                self.rendered = Some(RenderedContext {
                    context,
                    kind: document.kind(),
                });
                if document.expects_boot() {
                    self.watchdog.arm(generation, Instant::now());
                }
                tracing::debug!("Rendered {} document for generation {}", document.kind(), generation);
                self.emit(PreviewEvent::Rendered {
                    generation,
                    context,
                    kind: document.kind(),
                });
            }
            Err(err) => {
                tracing::error!("Render failed, keeping previous preview: {}", err);
                self.emit(PreviewEvent::RenderFailed {
                    generation,
                    reason: err.to_string(),
                });
            }
        }
    }

    fn handle_message(&mut self, message: &InboundMessage) {
        let signal = match message.decode(self.config.origin_policy) {
            Ok(decoded) => BootSignal::from(decoded),
            Err(err) => {
                tracing::debug!("Dropping sandbox message: {}", err);
                let reason = match err {
                    MessageError::OriginRejected(_) => IgnoreReason::OriginRejected,
                    MessageError::Unrecognized(_) => IgnoreReason::Malformed,
                };
                self.ignore(None, reason);
                return;
            }
        };

        if let Some(source) = message.source {
            let live = self.rendered.map(|rendered| rendered.context);
            if live != Some(source) {
                self.ignore(Some(signal.generation), IgnoreReason::StaleContext);
                return;
            }
        }

        match self
            .watchdog
            .acknowledge(signal, &self.sequencer, Instant::now())
        {
            AckOutcome::Acknowledged { latency } => {
                tracing::info!(
                    "Generation {} booted after {:?}",
                    signal.generation,
                    latency
                );
                self.emit(PreviewEvent::BootAcknowledged {
                    generation: signal.generation,
                    latency,
                });
            }
            AckOutcome::Stale => self.ignore(Some(signal.generation), IgnoreReason::StaleGeneration),
            AckOutcome::NotArmed => self.ignore(Some(signal.generation), IgnoreReason::NotArmed),
        }
    }

    fn handle_expiry(&mut self, generation: Generation) {
        match self.watchdog.expire(generation, &mut self.sequencer) {
            ExpiryOutcome::Killed {
                killed,
                replacement,
            } => {
                tracing::warn!(
                    "Generation {} did not boot within {:?}, killing preview",
                    killed,
                    self.watchdog.boot_deadline()
                );
                self.emit(PreviewEvent::Killed {
                    killed,
                    replacement,
                });
                self.render(&SynthesizedDocument::diagnostic(replacement));
            }
            ExpiryOutcome::Superseded => {
                tracing::debug!("Watchdog for superseded generation {} fired", generation);
            }
            ExpiryOutcome::AlreadyResolved => {
                tracing::trace!("Watchdog for generation {} already resolved", generation);
            }
        }
    }

    fn ignore(&self, generation: Option<Generation>, reason: IgnoreReason) {
        tracing::debug!("Ignoring boot signal for {:?}: {}", generation, reason);
        self.emit(PreviewEvent::SignalIgnored { generation, reason });
    }

    fn status(&self) -> PreviewStatus {
        PreviewStatus {
            current: self.sequencer.current(),
            rendered: self.rendered,
            armed_watchdogs: self.watchdog.armed_count(),
            pending_commit: self.debouncer.is_pending(),
            fragments: self.debouncer.buffer().snapshot(),
        }
    }

    fn emit(&self, event: PreviewEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
