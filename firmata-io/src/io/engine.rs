//! Protocol engine: owns the transport and drives one Firmata session.
//!
//! A single task reads the wire, mutates the [`PinRegistry`] and executes
//! queued commands, so registry writes never race. A second task dispatches
//! pin callbacks so user code can issue writes without re-entering the read
//! loop.

use crate::errors::Error;
use crate::errors::{ProtocolError, TransportError};
use crate::io::codec::{self, Message};
use crate::io::registry::{PinAddress, PinCallback, PinEvent, PinModeId, PinRegistry};
use crate::io::transports::Transport;
use log::{error, trace, warn};
use parking_lot::RwLock;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

/// Time allowed for the whole handshake before [`setup`](crate::hardware::Board::setup) gives up.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bytes the engine may discard while hunting for the handshake responses.
/// More noise than this before `Ready` means we are not talking to Firmata.
pub const HANDSHAKE_DESYNC_BUDGET: usize = 64;

/// Lifecycle of a board session.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum BoardState {
    /// No transport opened yet.
    #[default]
    Uninitialized,
    /// Queries sent, waiting for the protocol version.
    AwaitingVersion,
    /// Version received, waiting for the capability response.
    AwaitingCapabilities,
    /// Handshake done: pins are known and commands are accepted.
    Ready,
    /// Session over. Terminal.
    Closed,
}

impl Display for BoardState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BoardState::Uninitialized => "uninitialized",
            BoardState::AwaitingVersion => "awaiting version",
            BoardState::AwaitingCapabilities => "awaiting capabilities",
            BoardState::Ready => "ready",
            BoardState::Closed => "closed",
        };
        write!(f, "{}", label)
    }
}

/// Handler notified when the session fails after setup (lost transport,
/// decode troubles). Inspect the error, do not block: it runs on the engine
/// task.
pub type ErrorObserver = Arc<dyn Fn(&Error) + Send + Sync>;

type Completion = oneshot::Sender<Result<(), Error>>;

/// Work forwarded to the engine task. Every command resolves its completion
/// once the matching bytes are handed to the transport (there is no
/// per-command acknowledgment in the protocol).
pub(crate) enum Command {
    SetMode {
        pin: u8,
        mode: PinModeId,
        completion: Completion,
    },
    DigitalWrite {
        pin: u8,
        state: bool,
        completion: Completion,
    },
    AnalogWrite {
        pin: u8,
        value: u16,
        completion: Completion,
    },
    SetReporting {
        address: PinAddress,
        state: bool,
        completion: Completion,
    },
    SetCallback {
        address: PinAddress,
        callback: Option<PinCallback>,
        completion: Completion,
    },
    QueryState {
        pin: u8,
        completion: Completion,
    },
    SamplingInterval {
        interval: u16,
        completion: Completion,
    },
    SystemReset {
        completion: Completion,
    },
    Shutdown {
        completion: Completion,
    },
}

impl Command {
    /// The completion slot of this command, whatever its kind.
    fn completion(self) -> Completion {
        match self {
            Command::SetMode { completion, .. }
            | Command::DigitalWrite { completion, .. }
            | Command::AnalogWrite { completion, .. }
            | Command::SetReporting { completion, .. }
            | Command::SetCallback { completion, .. }
            | Command::QueryState { completion, .. }
            | Command::SamplingInterval { completion, .. }
            | Command::SystemReset { completion }
            | Command::Shutdown { completion } => completion,
        }
    }
}

/// State shared between the board facade, its pin handles and the engine task.
#[derive(Default)]
pub(crate) struct EngineShared {
    /// Session lifecycle. Written by the engine task (and by shutdown).
    pub(crate) state: RwLock<BoardState>,
    /// Pin table. Mutated by the engine task only; anyone may read snapshots.
    pub(crate) registry: RwLock<PinRegistry>,
    /// Intake of the engine task. `None` until setup spawns it.
    pub(crate) commands: RwLock<Option<UnboundedSender<Command>>>,
    /// Post-setup failure handler.
    pub(crate) observer: RwLock<Option<ErrorObserver>>,
}

impl Debug for EngineShared {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineShared")
            .field("state", &*self.state.read())
            .field("registry", &*self.registry.read())
            .finish()
    }
}

impl EngineShared {
    /// Enqueues a command and awaits its completion.
    ///
    /// Fails with [`NotReady`](Error::NotReady) outside the `Ready` state:
    /// commands make no sense before the pin table exists, and none is
    /// accepted after close.
    pub(crate) async fn run_command<F>(&self, operation: &'static str, build: F) -> Result<(), Error>
    where
        F: FnOnce(Completion) -> Command,
    {
        let state = *self.state.read();
        if state != BoardState::Ready {
            return Err(Error::NotReady { operation, state });
        }
        let Some(sender) = self.commands.read().clone() else {
            return Err(Error::Closed);
        };
        let (completion, resolved) = oneshot::channel();
        sender.send(build(completion)).map_err(|_| Error::Closed)?;
        // A dropped completion means the engine died mid-command.
        resolved.await.map_err(|_| Error::Closed)?
    }

    /// Stops the engine task, from any state. Idempotent: closing a closed
    /// (or never started) board reports success.
    pub(crate) async fn shutdown(&self) -> Result<(), Error> {
        let sender = self.commands.write().take();
        match sender {
            Some(sender) => {
                let (completion, resolved) = oneshot::channel();
                if sender.send(Command::Shutdown { completion }).is_ok() {
                    let _ = resolved.await;
                }
                Ok(())
            }
            None => {
                *self.state.write() = BoardState::Closed;
                Ok(())
            }
        }
    }
}

/// The engine task: exclusive owner of the transport and of registry writes.
pub(crate) struct Engine {
    shared: Arc<EngineShared>,
    transport: Box<dyn Transport>,
    commands: UnboundedReceiver<Command>,
    /// Changed-value notifications, drained by the dispatcher task.
    events: UnboundedSender<PinEvent>,
    /// Raw inbound bytes not yet decoded into a full message.
    buffer: Vec<u8>,
    /// Resolves the pending `setup()` future. Taken on first resolution.
    ready: Option<Completion>,
    /// Bytes discarded while resynchronizing during the handshake.
    discarded: usize,
}

impl Engine {
    /// Spawns the engine task and its callback dispatcher.
    ///
    /// Stores the command sender in `shared` so the facade and pin handles
    /// can reach the task. `ready` resolves when the handshake completes or
    /// the session dies trying.
    pub(crate) fn spawn(
        shared: Arc<EngineShared>,
        transport: Box<dyn Transport>,
        ready: Completion,
    ) {
        let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();
        let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
        *shared.commands.write() = Some(command_tx);

        Self::spawn_dispatcher(shared.clone(), event_rx);
        let engine = Engine {
            shared,
            transport,
            commands: command_rx,
            events: event_tx,
            buffer: vec![],
            ready: Some(ready),
            discarded: 0,
        };
        tokio::spawn(engine.run());
    }

    /// Runs callbacks away from the read loop.
    ///
    /// Events are handled strictly in order, one at a time: repeated reports
    /// of one pin reach its callback in arrival order. The callback slot is
    /// resolved per event, so replacing a callback affects every event not
    /// yet dispatched.
    fn spawn_dispatcher(shared: Arc<EngineShared>, mut events: UnboundedReceiver<PinEvent>) {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let callback = {
                    let registry = shared.registry.read();
                    registry
                        .get_pin(event.address)
                        .ok()
                        .and_then(|pin| pin.callback.clone())
                };
                if let Some(callback) = callback {
                    callback(event).await;
                }
            }
        });
    }

    async fn run(mut self) {
        let result = self.session().await;

        // Teardown: no command can reach the engine anymore.
        *self.shared.state.write() = BoardState::Closed;
        *self.shared.commands.write() = None;

        // Commands still queued never reach the wire: resolve them now.
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            let outcome = match &result {
                Ok(()) => Error::Closed,
                Err(_) => TransportError::Disconnected.into(),
            };
            let _ = command.completion().send(Err(outcome));
        }

        if let Err(error) = self.transport.close().await {
            trace!("Transport refused to close: {}", error);
        }

        match (self.ready.take(), result) {
            // Closed while setup was still pending.
            (Some(ready), Ok(())) => {
                let _ = ready.send(Err(Error::Closed));
            }
            (Some(ready), Err(error)) => {
                let _ = ready.send(Err(error));
            }
            (None, Ok(())) => trace!("Board connexion closed"),
            (None, Err(error)) => {
                let observer = self.shared.observer.read().clone();
                match observer {
                    Some(observer) => observer(&error),
                    None => error!("Board connexion lost: {}", error),
                }
            }
        }
    }

    /// One full session: open, handshake, then serve until shutdown or error.
    async fn session(&mut self) -> Result<(), Error> {
        self.transport.open().await?;
        *self.shared.state.write() = BoardState::AwaitingVersion;
        self.send(&Message::VersionQuery).await?;
        self.send(&Message::FirmwareQuery).await?;
        self.send(&Message::CapabilityQuery).await?;

        loop {
            tokio::select! {
                // Biased: inbound bytes are handled before queued commands,
                // so a lost transport preempts writes that would follow it.
                biased;

                chunk = self.transport.read() => {
                    let chunk = chunk?;
                    if chunk.is_empty() {
                        return Err(TransportError::Disconnected.into());
                    }
                    self.buffer.extend_from_slice(&chunk);
                    self.pump().await?;
                }
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { completion }) => {
                        *self.shared.state.write() = BoardState::Closed;
                        let _ = completion.send(Ok(()));
                        return Ok(());
                    }
                    Some(command) => self.execute(command).await,
                    // Facade and all handles gone: nothing left to serve.
                    None => return Ok(()),
                },
            }
        }
    }

    /// Decodes every complete message sitting in the buffer.
    async fn pump(&mut self) -> Result<(), Error> {
        loop {
            match codec::decode_next(&self.buffer) {
                // Head message incomplete: wait for more bytes.
                Ok((None, 0)) => return Ok(()),
                // Well-framed message we have no use for.
                Ok((None, skipped)) => {
                    self.buffer.drain(..skipped);
                }
                Ok((Some(message), consumed)) => {
                    self.buffer.drain(..consumed);
                    self.apply(message).await?;
                }
                Err(error) => self.resynchronize(error)?,
            }
        }
    }

    /// Drops one byte and retries: transient line noise costs exactly its own
    /// length. During the handshake the tolerance is bounded, since endless
    /// garbage there means the peer does not speak Firmata at all.
    fn resynchronize(&mut self, cause: ProtocolError) -> Result<(), Error> {
        self.buffer.remove(0);
        let state = *self.shared.state.read();
        if state == BoardState::Ready {
            warn!("Resynchronizing after decode error: {}", cause);
            let observer = self.shared.observer.read().clone();
            if let Some(observer) = observer {
                observer(&cause.into());
            }
            return Ok(());
        }
        self.discarded += 1;
        match self.discarded > HANDSHAKE_DESYNC_BUDGET {
            true => Err(Error::HandshakeTimeout),
            false => Ok(()),
        }
    }

    /// Applies one inbound message to the session.
    async fn apply(&mut self, message: Message) -> Result<(), Error> {
        match &message {
            Message::ProtocolVersion { major, minor } => {
                self.shared
                    .registry
                    .write()
                    .set_protocol_version(*major, *minor);
                let mut state = self.shared.state.write();
                if *state == BoardState::AwaitingVersion {
                    *state = BoardState::AwaitingCapabilities;
                }
            }
            Message::FirmwareReport { major, minor, name } => {
                self.shared.registry.write().set_firmware(*major, *minor, name);
            }
            Message::CapabilityResponse { pins } => {
                let state = *self.shared.state.read();
                match state {
                    BoardState::AwaitingCapabilities => {
                        self.shared.registry.write().populate(pins);
                        *self.shared.state.write() = BoardState::Ready;
                        trace!("Handshake complete: {:?}", self.shared);
                        if let Some(ready) = self.ready.take() {
                            let _ = ready.send(Ok(()));
                        }
                        // Channels got defaults from capability order; ask the
                        // board for the authoritative mapping.
                        self.send(&Message::AnalogMappingQuery).await?;
                    }
                    _ => trace!("Capability response ignored while {}", state),
                }
            }
            Message::AnalogMappingResponse { channels } => {
                self.shared.registry.write().apply_analog_mapping(channels);
            }
            Message::DigitalPortReport { .. }
            | Message::AnalogReport { .. }
            | Message::PinStateResponse { .. } => {
                let changes = self.shared.registry.write().apply_report(&message);
                for event in changes {
                    let _ = self.events.send(event);
                }
            }
            Message::StringData { text } => warn!("Board message: {}", text),
            other => trace!("Ignoring inbound message: {:?}", other),
        }
        Ok(())
    }

    /// Executes one queued command. Failures go to the issuing caller through
    /// the completion, never to the session: a dead transport shows up on the
    /// read side right after and ends the session there.
    async fn execute(&mut self, command: Command) {
        match command {
            Command::SetMode {
                pin,
                mode,
                completion,
            } => {
                let _ = completion.send(self.set_mode(pin, mode).await);
            }
            Command::DigitalWrite {
                pin,
                state,
                completion,
            } => {
                let _ = completion.send(self.digital_write(pin, state).await);
            }
            Command::AnalogWrite {
                pin,
                value,
                completion,
            } => {
                let _ = completion.send(self.analog_write(pin, value).await);
            }
            Command::SetReporting {
                address,
                state,
                completion,
            } => {
                let _ = completion.send(self.set_reporting(address, state).await);
            }
            Command::SetCallback {
                address,
                callback,
                completion,
            } => {
                let result = self.shared.registry.write().set_callback(address, callback);
                let _ = completion.send(result);
            }
            Command::QueryState { pin, completion } => {
                let _ = completion.send(self.send(&Message::PinStateQuery { pin }).await);
            }
            Command::SamplingInterval {
                interval,
                completion,
            } => {
                let _ = completion.send(self.send(&Message::SamplingInterval { interval }).await);
            }
            Command::SystemReset { completion } => {
                let _ = completion.send(self.send(&Message::SystemReset).await);
            }
            Command::Shutdown { completion } => {
                let _ = completion.send(Ok(()));
            }
        }
    }

    async fn send(&mut self, message: &Message) -> Result<(), Error> {
        self.transport.write_all(&codec::encode(message)).await
    }

    async fn set_mode(&mut self, pin: u8, mode: PinModeId) -> Result<(), Error> {
        self.send(&Message::SetPinMode { pin, mode }).await?;
        let mut registry = self.shared.registry.write();
        if let Ok(target) = registry.get_pin_mut(PinAddress::Digital(pin)) {
            target.mode = target.supports_mode(mode);
        }
        Ok(())
    }

    async fn digital_write(&mut self, pin: u8, state: bool) -> Result<(), Error> {
        self.send(&Message::SetDigitalPinValue { pin, state }).await?;
        if let Ok(target) = self
            .shared
            .registry
            .write()
            .get_pin_mut(PinAddress::Digital(pin))
        {
            target.value = u16::from(state);
        }
        Ok(())
    }

    async fn analog_write(&mut self, pin: u8, value: u16) -> Result<(), Error> {
        self.send(&Message::AnalogWrite { pin, value }).await?;
        if let Ok(target) = self
            .shared
            .registry
            .write()
            .get_pin_mut(PinAddress::Digital(pin))
        {
            target.value = value;
        }
        Ok(())
    }

    async fn set_reporting(&mut self, address: PinAddress, state: bool) -> Result<(), Error> {
        let message = match address {
            PinAddress::Analog(channel) => Message::ReportAnalog { channel, state },
            // Digital reporting is port wide on the wire.
            PinAddress::Digital(pin) => Message::ReportDigital {
                port: pin / 8,
                state,
            },
        };
        self.send(&message).await?;
        if let Ok(target) = self.shared.registry.write().get_pin_mut(address) {
            target.reporting = state;
        }
        Ok(())
    }
}
