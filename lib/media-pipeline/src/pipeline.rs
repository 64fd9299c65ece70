use crate::{
    AppSink, AppSrc, Bus, Caps, Element, ELEMENT_CHANNEL_SIZE, Message, POLL_INTERVAL,
    PipelineError, Result, Transform, buffer::StreamItem,
};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    Null,
    Ready,
    Playing,
}

struct Link {
    filter: Option<Caps>,
    element: Arc<dyn Element>,
}

/// A linear chain `appsrc ! element ... ! appsink`.
///
/// Every element runs on its own streaming thread once the pipeline is
/// `Playing`; buffers travel between them through bounded channels.
pub struct Pipeline {
    name: String,
    bus: Bus,
    state: State,
    source: Option<AppSrc>,
    links: Vec<Link>,
    sink: Option<(AppSink, Option<Caps>)>,

    // Input caps of each link and of the sink, filled in by negotiation.
    negotiated: Vec<Caps>,
    sink_caps: Option<Caps>,
    stopping: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bus: Bus::new(),
            state: State::Null,
            source: None,
            links: vec![],
            sink: None,
            negotiated: vec![],
            sink_caps: None,
            stopping: Arc::new(AtomicBool::new(false)),
            workers: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> Bus {
        self.bus.clone()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn add_source(&mut self, source: AppSrc) -> Result<()> {
        self.ensure_null("add source")?;

        if self.source.is_some() {
            return Err(PipelineError::InvalidState(format!(
                "`{}` already has a source",
                self.name
            )));
        }

        self.source = Some(source);
        Ok(())
    }

    pub fn link(&mut self, element: impl Element + 'static) -> Result<()> {
        self.link_filtered(element, None)
    }

    /// Append `element`, restricting the link into it to `filter`.
    pub fn link_filtered(
        &mut self,
        element: impl Element + 'static,
        filter: Option<Caps>,
    ) -> Result<()> {
        self.ensure_null("link element")?;

        if self.source.is_none() || self.sink.is_some() {
            return Err(PipelineError::InvalidState(format!(
                "`{}` links elements between the source and the sink",
                element.name()
            )));
        }

        self.links.push(Link {
            filter,
            element: Arc::new(element),
        });
        Ok(())
    }

    pub fn add_sink(&mut self, sink: AppSink, filter: Option<Caps>) -> Result<()> {
        self.ensure_null("add sink")?;

        if self.sink.is_some() {
            return Err(PipelineError::InvalidState(format!(
                "`{}` already has a sink",
                self.name
            )));
        }

        if self.links.is_empty() {
            return Err(PipelineError::InvalidState(format!(
                "`{}` needs at least one element before the sink",
                self.name
            )));
        }

        self.sink = Some((sink, filter));
        Ok(())
    }

    pub fn set_state(&mut self, state: State) -> Result<()> {
        if state == self.state {
            return Ok(());
        }

        log::info!("`{}` state {:?} -> {:?}", self.name, self.state, state);

        match (self.state, state) {
            (State::Null, State::Ready) => self.negotiate(),
            (State::Null, State::Playing) => {
                self.negotiate()?;
                self.start()
            }
            (State::Ready, State::Playing) => self.start(),
            (State::Ready, State::Null) => {
                self.change_state(State::Null);
                Ok(())
            }
            (State::Playing, _) => {
                self.stop();
                self.change_state(State::Ready);

                if state == State::Null {
                    self.change_state(State::Null);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn ensure_null(&self, action: &str) -> Result<()> {
        if self.state != State::Null {
            return Err(PipelineError::InvalidState(format!(
                "`{}` can not {action} in {:?} state",
                self.name, self.state
            )));
        }

        Ok(())
    }

    fn change_state(&mut self, new: State) {
        let old = self.state;
        self.state = new;
        self.bus.post(Message::StateChanged { old, new });
    }

    fn negotiate(&mut self) -> Result<()> {
        let result = self.negotiate_links();

        match result {
            Ok((negotiated, sink_caps)) => {
                self.negotiated = negotiated;
                self.sink_caps = Some(sink_caps);
                self.change_state(State::Ready);
                Ok(())
            }
            Err(e) => {
                log::warn!("`{}` negotiation failed: {e}", self.name);
                self.bus.post(Message::Error {
                    source: self.name.clone(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn negotiate_links(&self) -> Result<(Vec<Caps>, Caps)> {
        let (Some(source), Some((sink, sink_filter))) = (&self.source, &self.sink) else {
            return Err(PipelineError::InvalidState(format!(
                "`{}` needs a source and a sink",
                self.name
            )));
        };

        let mut caps = source.caps().clone();
        let mut negotiated = Vec::with_capacity(self.links.len());

        for link in &self.links {
            let input = caps.intersect(link.filter.as_ref())?;
            caps = link.element.negotiate(&input)?;

            log::debug!(
                "`{}` negotiated `{input}` -> `{caps}`",
                link.element.name()
            );
            negotiated.push(input);
        }

        let caps = caps.intersect(sink_filter.as_ref())?;
        log::info!("`{}` negotiated `{caps}`", sink.name());

        Ok((negotiated, caps))
    }

    fn start(&mut self) -> Result<()> {
        let (Some(source), Some((sink, _))) = (self.source.clone(), self.sink.clone()) else {
            return Err(PipelineError::InvalidState(format!(
                "`{}` needs a source and a sink",
                self.name
            )));
        };

        self.stopping.store(false, Ordering::Release);
        source.reset();
        if let Some(caps) = self.sink_caps.clone() {
            sink.reset(caps);
        }

        let context = StreamContext {
            bus: self.bus.clone(),
            source: source.clone(),
            sink: sink.clone(),
            stopping: self.stopping.clone(),
        };

        let mut stages = Vec::with_capacity(self.links.len());
        let mut input = source.receiver();

        for (index, (link, caps)) in self.links.iter().zip(&self.negotiated).enumerate() {
            if index + 1 == self.links.len() {
                stages.push((
                    link.element.clone(),
                    caps.clone(),
                    input.clone(),
                    Output::Sink(sink.clone()),
                ));
            } else {
                let (sender, receiver) = bounded(ELEMENT_CHANNEL_SIZE);
                let this_input = std::mem::replace(&mut input, receiver);
                stages.push((
                    link.element.clone(),
                    caps.clone(),
                    this_input,
                    Output::Link(sender),
                ));
            }
        }

        let (ready_sender, ready_receiver) = bounded(stages.len());
        let stage_counts = stages.len();

        for (element, caps, input, output) in stages {
            self.spawn_streaming_thread(
                element,
                caps,
                input,
                output,
                context.clone(),
                ready_sender.clone(),
            )?;
        }
        drop(ready_sender);

        for _ in 0..stage_counts {
            match ready_receiver.recv() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::warn!("`{}` failed to start: {e}", self.name);
                    self.stop();
                    return Err(e);
                }
                Err(_) => {
                    self.stop();
                    return Err(PipelineError::InvalidState(
                        "streaming thread exited before start".to_string(),
                    ));
                }
            }
        }

        self.change_state(State::Playing);
        self.bus.post(Message::StreamStart);
        Ok(())
    }

    fn spawn_streaming_thread(
        &mut self,
        element: Arc<dyn Element>,
        caps: Caps,
        input: Receiver<StreamItem>,
        output: Output,
        context: StreamContext,
        ready: Sender<Result<()>>,
    ) -> Result<()> {
        let thread_name = format!("{}:{}", self.name, element.name());

        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || streaming_loop(element, caps, input, output, context, ready));

        match handle {
            Ok(handle) => {
                self.workers.push(handle);
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(PipelineError::ThreadSpawn(e))
            }
        }
    }

    fn stop(&mut self) {
        self.stopping.store(true, Ordering::Release);

        if let Some(source) = &self.source {
            source.set_flushing(true);
        }

        if let Some((sink, _)) = &self.sink {
            sink.set_flushing(true);
        }

        for (i, handle) in self.workers.drain(..).enumerate() {
            if let Err(e) = handle.join() {
                log::warn!("join streaming thread[{i}] failed: {:?}", e);
            } else {
                log::debug!("join streaming thread[{i}] successfully");
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.set_state(State::Null) {
            log::warn!("`{}` stop on drop failed: {e}", self.name);
        }
    }
}

#[derive(Clone)]
struct StreamContext {
    bus: Bus,
    source: AppSrc,
    sink: AppSink,
    stopping: Arc<AtomicBool>,
}

impl StreamContext {
    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Post the error and unblock the application on both ends.
    fn error(&self, element: &str, error: PipelineError) {
        log::warn!("`{element}` streaming error: {error}");

        self.bus.post(Message::Error {
            source: element.to_string(),
            message: error.to_string(),
        });
        self.source.set_flushing(true);
        self.sink.set_flushing(true);
    }
}

enum Output {
    Link(Sender<StreamItem>),
    Sink(AppSink),
}

impl Output {
    fn push(&self, item: StreamItem) -> bool {
        match self {
            Output::Link(sender) => sender.send(item).is_ok(),
            Output::Sink(sink) => {
                sink.render(item);
                true
            }
        }
    }

    fn push_all(&self, buffers: Vec<crate::Buffer>) -> bool {
        buffers
            .into_iter()
            .all(|buffer| self.push(StreamItem::Buffer(buffer)))
    }
}

fn streaming_loop(
    element: Arc<dyn Element>,
    caps: Caps,
    input: Receiver<StreamItem>,
    output: Output,
    context: StreamContext,
    ready: Sender<Result<()>>,
) {
    let name = element.name().to_string();
    let mut transform: Box<dyn Transform> = match element.start(&caps) {
        Ok(transform) => {
            _ = ready.send(Ok(()));
            transform
        }
        Err(e) => {
            context.bus.post(Message::Error {
                source: name.clone(),
                message: e.to_string(),
            });
            _ = ready.send(Err(e));
            return;
        }
    };
    drop(ready);

    log::debug!("`{name}` streaming thread started");

    let mut processed = 0u64;
    loop {
        if context.is_stopping() {
            log::debug!("`{name}` stopping after {processed} buffers");
            break;
        }

        let item = match input.recv_timeout(POLL_INTERVAL) {
            Ok(item) => item,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::debug!("`{name}` upstream disconnected");
                break;
            }
        };

        match item {
            StreamItem::Buffer(buffer) => {
                processed += 1;

                match transform.chain(buffer) {
                    Ok(buffers) => {
                        if !output.push_all(buffers) {
                            log::debug!("`{name}` downstream gone");
                            break;
                        }
                    }
                    Err(e) => {
                        context.error(&name, e);
                        break;
                    }
                }
            }
            StreamItem::Eos => {
                match transform.drain() {
                    Ok(buffers) => {
                        if !output.push_all(buffers) {
                            break;
                        }
                    }
                    Err(e) => {
                        context.error(&name, e);
                        break;
                    }
                }

                let is_sink = matches!(output, Output::Sink(_));
                if output.push(StreamItem::Eos) && is_sink {
                    context.bus.post(Message::Eos);
                }

                log::info!("`{name}` reached end of stream after {processed} buffers");
                break;
            }
        }
    }
}
