//! Render adapter: binds declarative render requests to one stateful engine instance.
//!
//! The first [`RenderAdapter::render`] starts loading the engine and returns a [`LoadTask`] for
//! the host to drive on its executor. Requests arriving while the load is in flight only replace
//! the pending config, so the instance is built once, from the latest request. After that every
//! render updates the same instance in place.
//!
//! The engine is loaded at most once per view. If building the instance fails after a
//! successful load, the engine is kept and the next render builds from it synchronously.
//!
//! ```text
//! Uninitialized --render--> Loading --task resolves--> Attached --render--> Attached
//!       \                      \                          /
//!        +---------------------+------- unmount ---------+--> Cancelled
//! ```

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use log::{debug, trace, warn};
use thiserror::Error;

use crate::config::{ConfigError, QrRenderRequest, RenderConfig};
use crate::engine::{Engine, EngineError, EngineInstance, EngineLoader, LoadFuture, SharedSurface};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("invalid render request: {0}")]
    InvalidRequest(#[from] ConfigError),
    #[error("failed to load rendering engine: {0}")]
    EngineLoad(#[source] EngineError),
    #[error("rendering engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("no surface mounted")]
    NotMounted,
    #[error("a surface is already mounted")]
    AlreadyMounted,
    #[error("adapter was unmounted")]
    Unmounted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterState {
    Uninitialized,
    Loading,
    Attached,
    Cancelled,
}

/// How a [`LoadTask`] finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Attached,
    /// The view unmounted before the engine arrived; nothing was attached.
    Cancelled,
}

enum Phase<I> {
    Uninitialized,
    Loading { latest: RenderConfig },
    Attached { instance: I },
    Cancelled,
}

struct Slot<E: Engine> {
    phase: Phase<E::Instance>,
    surface: Option<SharedSurface>,
    /// Set once the load resolves and kept until unmount.
    engine: Option<Rc<E>>,
    cancelled: bool,
}

impl<E: Engine> Slot<E> {
    fn state(&self) -> AdapterState {
        match self.phase {
            Phase::Uninitialized => AdapterState::Uninitialized,
            Phase::Loading { .. } => AdapterState::Loading,
            Phase::Attached { .. } => AdapterState::Attached,
            Phase::Cancelled => AdapterState::Cancelled,
        }
    }
}

/// Owns at most one engine instance for one mounted view.
pub struct RenderAdapter<L: EngineLoader> {
    loader: L,
    slot: Rc<RefCell<Slot<L::Engine>>>,
}

impl<L: EngineLoader> RenderAdapter<L> {
    pub fn new(loader: L) -> Self {
        let slot = Slot {
            phase: Phase::Uninitialized,
            surface: None,
            engine: None,
            cancelled: false,
        };
        RenderAdapter {
            loader,
            slot: Rc::new(RefCell::new(slot)),
        }
    }

    /// Registers the surface output is attached to. Nothing is drawn until the first render.
    ///
    /// A view owns one surface for its lifetime, so a second mount is rejected.
    pub fn mount(&mut self, surface: SharedSurface) -> Result<(), RenderError> {
        let mut slot = self.slot.borrow_mut();
        if slot.cancelled {
            return Err(RenderError::Unmounted);
        }
        if slot.surface.is_some() {
            return Err(RenderError::AlreadyMounted);
        }
        debug!("render adapter mounted");
        slot.surface = Some(surface);
        Ok(())
    }

    /// Applies a request.
    ///
    /// Returns the engine [`LoadTask`] on the first call; the host must drive it to completion.
    /// Later calls return `None`: while loading they replace the pending config, once attached
    /// they update the instance in place.
    pub fn render(
        &mut self,
        request: &QrRenderRequest,
    ) -> Result<Option<LoadTask<L::Engine>>, RenderError> {
        let config = request.resolve()?;
        let mut slot = self.slot.borrow_mut();
        if slot.cancelled {
            return Err(RenderError::Unmounted);
        }
        let surface = match slot.surface.clone() {
            Some(surface) => surface,
            None => return Err(RenderError::NotMounted),
        };

        match &mut slot.phase {
            Phase::Uninitialized => {}
            Phase::Loading { latest } => {
                trace!("engine still loading, replacing pending config");
                *latest = config;
                return Ok(None);
            }
            Phase::Attached { instance } => {
                trace!("updating attached instance in place");
                instance.update(&config)?;
                return Ok(None);
            }
            Phase::Cancelled => return Err(RenderError::Unmounted),
        }

        slot.phase = Phase::Loading {
            latest: config.clone(),
        };
        let loaded = slot.engine.clone();
        if let Some(engine) = loaded {
            debug!("engine already loaded, building instance");
            drop(slot);
            attach_pending(&self.slot, &engine, config, surface)?;
            return Ok(None);
        }

        debug!("first render, loading engine");
        drop(slot);
        Ok(Some(LoadTask {
            load: self.loader.load(),
            slot: Rc::clone(&self.slot),
            done: false,
        }))
    }

    /// Cancels any in-flight load and releases the instance. Terminal.
    pub fn unmount(&mut self) {
        let mut slot = self.slot.borrow_mut();
        if slot.cancelled {
            return;
        }
        debug!("render adapter unmounted in state {:?}", slot.state());
        slot.cancelled = true;
        slot.phase = Phase::Cancelled;
        slot.surface = None;
        slot.engine = None;
    }

    pub fn state(&self) -> AdapterState {
        self.slot.borrow().state()
    }

    /// Runs `f` against the attached instance, if there is one.
    pub fn with_instance<R>(
        &self,
        f: impl FnOnce(&<L::Engine as Engine>::Instance) -> R,
    ) -> Option<R> {
        match &self.slot.borrow().phase {
            Phase::Attached { instance } => Some(f(instance)),
            _ => None,
        }
    }
}

impl<L: EngineLoader> Drop for RenderAdapter<L> {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl<L: EngineLoader> fmt::Debug for RenderAdapter<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderAdapter")
            .field("state", &self.state())
            .finish()
    }
}

/// Builds an instance from `config`, attaches it, then catches up with any config that
/// arrived meanwhile. The slot is never borrowed while engine or surface code runs.
fn attach_pending<E: Engine>(
    slot: &RefCell<Slot<E>>,
    engine: &E,
    mut config: RenderConfig,
    surface: SharedSurface,
) -> Result<LoadOutcome, RenderError> {
    let built = engine.construct(&config).and_then(|mut instance| {
        surface.borrow_mut().clear();
        instance.attach(surface)?;
        Ok(instance)
    });
    let mut instance = match built {
        Ok(instance) => instance,
        Err(err) => {
            abandon_load(slot);
            return Err(err.into());
        }
    };

    loop {
        let mut guard = slot.borrow_mut();
        if guard.cancelled {
            return Ok(LoadOutcome::Cancelled);
        }
        let newer = match &guard.phase {
            Phase::Loading { latest } => (*latest != config).then(|| latest.clone()),
            _ => return Ok(LoadOutcome::Cancelled),
        };
        match newer {
            Some(latest) => {
                drop(guard);
                trace!("config replaced while building, updating new instance");
                if let Err(err) = instance.update(&latest) {
                    abandon_load(slot);
                    return Err(err.into());
                }
                config = latest;
            }
            None => {
                guard.phase = Phase::Attached { instance };
                debug!("instance attached");
                return Ok(LoadOutcome::Attached);
            }
        }
    }
}

/// Returns a slot stuck in `Loading` to `Uninitialized`.
fn abandon_load<E: Engine>(slot: &RefCell<Slot<E>>) {
    if let Ok(mut slot) = slot.try_borrow_mut() {
        if matches!(slot.phase, Phase::Loading { .. }) {
            slot.phase = Phase::Uninitialized;
        }
    }
}

/// The engine load started by the first render.
///
/// Resolving attaches a new instance built from the latest pending config, unless the adapter
/// was unmounted in the meantime. Dropping an unfinished task abandons the load, so the next
/// render starts a new one.
#[must_use = "the engine is only attached once the task is driven to completion"]
pub struct LoadTask<E: Engine> {
    load: LoadFuture<E>,
    slot: Rc<RefCell<Slot<E>>>,
    done: bool,
}

impl<E: Engine> LoadTask<E> {
    fn finish(&mut self, loaded: Result<E, EngineError>) -> Result<LoadOutcome, RenderError> {
        self.done = true;
        let (engine, config, surface) = {
            let mut slot = self.slot.borrow_mut();
            if slot.cancelled {
                warn!("engine load resolved after unmount, discarding");
                return Ok(LoadOutcome::Cancelled);
            }
            let config = match &slot.phase {
                Phase::Loading { latest } => latest.clone(),
                // Another task already settled this slot.
                _ => return Ok(LoadOutcome::Cancelled),
            };
            let engine = match loaded {
                Ok(engine) => Rc::new(engine),
                Err(err) => {
                    warn!("engine load failed: {}", err);
                    slot.phase = Phase::Uninitialized;
                    return Err(RenderError::EngineLoad(err));
                }
            };
            let surface = match slot.surface.clone() {
                Some(surface) => surface,
                None => {
                    slot.phase = Phase::Uninitialized;
                    return Err(RenderError::NotMounted);
                }
            };
            debug!("engine loaded");
            slot.engine = Some(Rc::clone(&engine));
            (engine, config, surface)
        };
        attach_pending(&self.slot, &engine, config, surface)
    }
}

impl<E: Engine> Future for LoadTask<E> {
    type Output = Result<LoadOutcome, RenderError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.load.as_mut().poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(loaded) => Poll::Ready(this.finish(loaded)),
        }
    }
}

impl<E: Engine> Drop for LoadTask<E> {
    fn drop(&mut self) {
        if !self.done {
            debug!("load task dropped before the engine arrived");
            abandon_load(&self.slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BufferSurface, RenderedOutput, Surface};
    use std::cell::Cell;
    use std::rc::Weak;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Counts every call the adapter makes on the engine.
    #[derive(Default)]
    struct Calls {
        loads: Cell<usize>,
        constructs: Cell<usize>,
        updates: Cell<usize>,
        attaches: Cell<usize>,
        last_size: Cell<u32>,
    }

    struct RecordingEngine {
        calls: Rc<Calls>,
    }

    struct RecordingInstance {
        id: usize,
        calls: Rc<Calls>,
        output: RenderedOutput,
    }

    impl Engine for RecordingEngine {
        type Instance = RecordingInstance;

        fn construct(&self, config: &RenderConfig) -> Result<RecordingInstance, EngineError> {
            if config.width < 50 {
                return Err(EngineError::TooSmall {
                    size: config.width,
                    modules: 25,
                });
            }
            let id = self.calls.constructs.get() + 1;
            self.calls.constructs.set(id);
            self.calls.last_size.set(config.width);
            Ok(RecordingInstance {
                id,
                calls: Rc::clone(&self.calls),
                output: RenderedOutput::Svg(format!("<svg width=\"{}\"/>", config.width)),
            })
        }
    }

    impl EngineInstance for RecordingInstance {
        fn update(&mut self, config: &RenderConfig) -> Result<(), EngineError> {
            self.calls.updates.set(self.calls.updates.get() + 1);
            self.calls.last_size.set(config.width);
            self.output = RenderedOutput::Svg(format!("<svg width=\"{}\"/>", config.width));
            Ok(())
        }

        fn attach(&mut self, surface: SharedSurface) -> Result<(), EngineError> {
            self.calls.attaches.set(self.calls.attaches.get() + 1);
            surface.borrow_mut().present(&self.output);
            Ok(())
        }

        fn output(&self) -> &RenderedOutput {
            &self.output
        }
    }

    struct RecordingLoader {
        calls: Rc<Calls>,
        fail: bool,
    }

    impl EngineLoader for RecordingLoader {
        type Engine = RecordingEngine;

        fn load(&self) -> LoadFuture<RecordingEngine> {
            self.calls.loads.set(self.calls.loads.get() + 1);
            let result = if self.fail {
                Err(EngineError::Unavailable("module fetch failed".into()))
            } else {
                Ok(RecordingEngine { calls: Rc::clone(&self.calls) })
            };
            Box::pin(std::future::ready(result))
        }
    }

    type Mounted = (
        RenderAdapter<RecordingLoader>,
        Rc<Calls>,
        Rc<RefCell<BufferSurface>>,
    );

    fn mounted(fail: bool) -> Mounted {
        init_logger();
        let calls = Rc::new(Calls::default());
        let mut adapter = RenderAdapter::new(RecordingLoader { calls: Rc::clone(&calls), fail });
        let surface = BufferSurface::shared();
        adapter.mount(surface.clone()).unwrap();
        (adapter, calls, surface)
    }

    fn request(size: u32) -> QrRenderRequest {
        QrRenderRequest::new("https://example.com", size)
    }

    #[test]
    fn test_first_render_loads_and_attaches() {
        let (mut adapter, calls, surface) = mounted(false);
        assert_eq!(adapter.state(), AdapterState::Uninitialized);

        let task = adapter.render(&request(256)).unwrap().expect("first render starts a load");
        assert_eq!(adapter.state(), AdapterState::Loading);
        assert_eq!(calls.constructs.get(), 0);

        assert_eq!(pollster::block_on(task).unwrap(), LoadOutcome::Attached);
        assert_eq!(adapter.state(), AdapterState::Attached);
        assert_eq!(calls.constructs.get(), 1);
        assert_eq!(calls.attaches.get(), 1);
        let surface = surface.borrow();
        assert_eq!(surface.clears(), 1);
        assert_eq!(surface.output(), Some(&RenderedOutput::Svg("<svg width=\"256\"/>".into())));
    }

    #[test]
    fn test_rapid_renders_build_one_instance_from_latest() {
        let (mut adapter, calls, _surface) = mounted(false);
        let task = adapter.render(&request(200)).unwrap().unwrap();
        assert!(adapter.render(&request(300)).unwrap().is_none());
        assert_eq!(calls.loads.get(), 1);

        pollster::block_on(task).unwrap();
        assert_eq!(calls.constructs.get(), 1);
        assert_eq!(calls.updates.get(), 0);
        assert_eq!(calls.last_size.get(), 300);
    }

    #[test]
    fn test_unmount_before_load_prevents_attach() {
        let (mut adapter, calls, surface) = mounted(false);
        let task = adapter.render(&request(256)).unwrap().unwrap();
        adapter.unmount();
        assert_eq!(adapter.state(), AdapterState::Cancelled);

        assert_eq!(pollster::block_on(task).unwrap(), LoadOutcome::Cancelled);
        assert_eq!(calls.constructs.get(), 0);
        assert_eq!(calls.attaches.get(), 0);
        assert_eq!(surface.borrow().presents(), 0);
        assert_eq!(surface.borrow().clears(), 0);
    }

    #[test]
    fn test_drop_acts_as_unmount() {
        let (mut adapter, calls, _surface) = mounted(false);
        let task = adapter.render(&request(256)).unwrap().unwrap();
        drop(adapter);
        assert_eq!(pollster::block_on(task).unwrap(), LoadOutcome::Cancelled);
        assert_eq!(calls.attaches.get(), 0);
    }

    #[test]
    fn test_attached_render_updates_in_place() {
        let (mut adapter, calls, surface) = mounted(false);
        pollster::block_on(adapter.render(&request(200)).unwrap().unwrap()).unwrap();
        let id = adapter.with_instance(|instance| instance.id).unwrap();

        assert!(adapter.render(&request(300)).unwrap().is_none());
        assert_eq!(calls.constructs.get(), 1);
        assert_eq!(calls.updates.get(), 1);
        assert_eq!(calls.last_size.get(), 300);
        assert_eq!(adapter.with_instance(|instance| instance.id), Some(id));
        // no clear on update
        assert_eq!(surface.borrow().clears(), 1);
    }

    #[test]
    fn test_invalid_request_leaves_state_alone() {
        let (mut adapter, calls, _surface) = mounted(false);
        let err = adapter.render(&QrRenderRequest::new("", 256)).err().unwrap();
        assert!(matches!(err, RenderError::InvalidRequest(ConfigError::EmptyContent)));
        let err = adapter.render(&request(0)).err().unwrap();
        assert!(matches!(err, RenderError::InvalidRequest(ConfigError::InvalidSize(0))));
        assert_eq!(adapter.state(), AdapterState::Uninitialized);
        assert_eq!(calls.loads.get(), 0);
    }

    #[test]
    fn test_render_requires_mount() {
        init_logger();
        let calls = Rc::new(Calls::default());
        let mut adapter = RenderAdapter::new(RecordingLoader {
            calls: Rc::clone(&calls),
            fail: false,
        });
        assert!(matches!(adapter.render(&request(256)), Err(RenderError::NotMounted)));
        assert_eq!(calls.loads.get(), 0);
    }

    #[test]
    fn test_render_after_unmount_is_rejected() {
        let (mut adapter, _calls, surface) = mounted(false);
        adapter.unmount();
        assert!(matches!(adapter.render(&request(256)), Err(RenderError::Unmounted)));
        let surface: SharedSurface = surface;
        assert!(matches!(adapter.mount(surface), Err(RenderError::Unmounted)));
    }

    #[test]
    fn test_load_failure_surfaces_and_allows_new_attempt() {
        let (mut adapter, calls, surface) = mounted(true);
        let task = adapter.render(&request(256)).unwrap().unwrap();
        let err = pollster::block_on(task).unwrap_err();
        assert!(matches!(err, RenderError::EngineLoad(EngineError::Unavailable(_))));
        assert_eq!(adapter.state(), AdapterState::Uninitialized);
        assert_eq!(calls.loads.get(), 1);
        assert_eq!(surface.borrow().presents(), 0);

        // no automatic retry; the next render starts a fresh load
        assert!(adapter.render(&request(256)).unwrap().is_some());
        assert_eq!(calls.loads.get(), 2);
    }

    #[test]
    fn test_pending_load_is_polled_again() {
        use std::sync::Arc;
        use std::task::{Wake, Waker};

        struct NoopWake;
        impl Wake for NoopWake {
            fn wake(self: Arc<Self>) {}
        }

        struct YieldOnce(bool);
        impl Future for YieldOnce {
            type Output = ();
            fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
                if self.0 {
                    Poll::Ready(())
                } else {
                    self.0 = true;
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
        }

        struct SlowLoader(Rc<Calls>);
        impl EngineLoader for SlowLoader {
            type Engine = RecordingEngine;
            fn load(&self) -> LoadFuture<RecordingEngine> {
                let calls = Rc::clone(&self.0);
                Box::pin(async move {
                    YieldOnce(false).await;
                    Ok::<_, EngineError>(RecordingEngine { calls })
                })
            }
        }

        init_logger();
        let calls = Rc::new(Calls::default());
        let mut adapter = RenderAdapter::new(SlowLoader(Rc::clone(&calls)));
        adapter.mount(BufferSurface::shared()).unwrap();
        let mut task = adapter.render(&request(200)).unwrap().unwrap();

        let waker = Waker::from(Arc::new(NoopWake));
        let mut cx = Context::from_waker(&waker);
        assert!(Pin::new(&mut task).poll(&mut cx).is_pending());
        assert_eq!(adapter.state(), AdapterState::Loading);

        // arrives while the load is suspended
        assert!(adapter.render(&request(320)).unwrap().is_none());
        assert!(matches!(
            Pin::new(&mut task).poll(&mut cx),
            Poll::Ready(Ok(LoadOutcome::Attached))
        ));
        assert_eq!(calls.last_size.get(), 320);
        assert_eq!(calls.constructs.get(), 1);
    }

    #[test]
    fn test_failed_build_keeps_loaded_engine() {
        let (mut adapter, calls, surface) = mounted(false);
        let task = adapter.render(&request(12)).unwrap().unwrap();
        let err = pollster::block_on(task).unwrap_err();
        assert!(matches!(err, RenderError::Engine(EngineError::TooSmall { size: 12, .. })));
        assert_eq!(adapter.state(), AdapterState::Uninitialized);

        // built synchronously from the engine already loaded
        assert!(adapter.render(&request(256)).unwrap().is_none());
        assert_eq!(adapter.state(), AdapterState::Attached);
        assert_eq!(calls.loads.get(), 1);
        assert_eq!(calls.attaches.get(), 1);
        assert_eq!(surface.borrow().clears(), 1);
        assert_eq!(calls.last_size.get(), 256);
    }

    #[test]
    fn test_failed_sync_build_is_reported() {
        let (mut adapter, calls, _surface) = mounted(false);
        let task = adapter.render(&request(12)).unwrap().unwrap();
        assert!(pollster::block_on(task).is_err());

        let err = adapter.render(&request(20)).err().unwrap();
        assert!(matches!(err, RenderError::Engine(EngineError::TooSmall { size: 20, .. })));
        assert_eq!(adapter.state(), AdapterState::Uninitialized);
        assert_eq!(calls.loads.get(), 1);
    }

    #[test]
    fn test_second_mount_is_rejected() {
        let (mut adapter, _calls, surface) = mounted(false);
        pollster::block_on(adapter.render(&request(200)).unwrap().unwrap()).unwrap();

        let other = BufferSurface::shared();
        assert!(matches!(adapter.mount(other.clone()), Err(RenderError::AlreadyMounted)));
        adapter.render(&request(300)).unwrap();
        assert_eq!(other.borrow().presents(), 0);
        assert_eq!(surface.borrow().presents(), 1);
        assert_eq!(adapter.state(), AdapterState::Attached);
    }

    #[test]
    fn test_dropped_task_allows_new_load() {
        let (mut adapter, calls, _surface) = mounted(false);
        let task = adapter.render(&request(200)).unwrap().unwrap();
        drop(task);
        assert_eq!(adapter.state(), AdapterState::Uninitialized);

        let task = adapter.render(&request(300)).unwrap().expect("a new load starts");
        assert_eq!(calls.loads.get(), 2);
        assert_eq!(pollster::block_on(task).unwrap(), LoadOutcome::Attached);
        assert_eq!(calls.last_size.get(), 300);
    }

    /// Reads the adapter back while being presented to, and asks for a resize once.
    struct ReentrantSurface {
        adapter: Weak<RefCell<RenderAdapter<RecordingLoader>>>,
        seen: Vec<AdapterState>,
        resized: bool,
    }

    impl Surface for ReentrantSurface {
        fn clear(&mut self) {}

        fn present(&mut self, _output: &RenderedOutput) {
            let adapter = match self.adapter.upgrade() {
                Some(adapter) => adapter,
                None => return,
            };
            self.seen.push(adapter.borrow().state());
            if !self.resized {
                self.resized = true;
                assert!(adapter.borrow_mut().render(&request(320)).unwrap().is_none());
            }
        }
    }

    #[test]
    fn test_surface_may_use_adapter_while_attaching() {
        init_logger();
        let calls = Rc::new(Calls::default());
        let loader = RecordingLoader {
            calls: Rc::clone(&calls),
            fail: false,
        };
        let adapter = Rc::new(RefCell::new(RenderAdapter::new(loader)));
        let surface = Rc::new(RefCell::new(ReentrantSurface {
            adapter: Rc::downgrade(&adapter),
            seen: Vec::new(),
            resized: false,
        }));
        adapter.borrow_mut().mount(surface.clone()).unwrap();

        let task = adapter.borrow_mut().render(&request(200)).unwrap().unwrap();
        assert_eq!(pollster::block_on(task).unwrap(), LoadOutcome::Attached);

        assert_eq!(surface.borrow().seen, vec![AdapterState::Loading]);
        assert_eq!(adapter.borrow().state(), AdapterState::Attached);
        // the resize requested mid-attach reached the new instance
        assert_eq!(calls.constructs.get(), 1);
        assert_eq!(calls.updates.get(), 1);
        assert_eq!(calls.last_size.get(), 320);
    }
}
