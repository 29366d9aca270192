use std::pin::Pin;

/// A boxed async stream, used for agent event generators.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// The stream shape every agent role and flow produces: typed events,
/// terminated by either exhaustion or an error the runner translates
/// into an `error` event.
pub type EventStream<'a> = BoxStream<'a, crate::Result<crate::event::AgentEvent>>;
