// Container repackaging seam: transport-stream bytes in, container events out.

use bytes::{Bytes, BytesMut};

use crate::error::ClipError;

/// One unit of output from a repackaging session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepackageEvent {
    pub init_segment: Option<Bytes>,
    pub fragment: Option<Bytes>,
}

/// A single push/flush run over one clip's bytes.
pub trait RepackageSession: Send {
    fn push(&mut self, data: Bytes) -> Result<(), ClipError>;

    /// Drains everything produced so far, in emission order.
    fn flush(&mut self) -> Result<Vec<RepackageEvent>, ClipError>;
}

pub trait Repackager: Send + Sync {
    fn session(&self) -> Box<dyn RepackageSession>;

    /// Extension of the produced container, without the dot.
    fn container_extension(&self) -> &str;
}

/// Keeps the first init segment and appends every fragment in order.
pub fn collect_artifact(events: impl IntoIterator<Item = RepackageEvent>) -> Bytes {
    let mut init: Option<Bytes> = None;
    let mut fragments: Vec<Bytes> = Vec::new();

    for event in events {
        if let Some(segment) = event.init_segment
            && init.is_none()
        {
            init = Some(segment);
        }
        if let Some(fragment) = event.fragment {
            fragments.push(fragment);
        }
    }

    let total = init.as_ref().map_or(0, Bytes::len) + fragments.iter().map(Bytes::len).sum::<usize>();
    let mut artifact = BytesMut::with_capacity(total);
    if let Some(init) = init {
        artifact.extend_from_slice(&init);
    }
    for fragment in fragments {
        artifact.extend_from_slice(&fragment);
    }
    artifact.freeze()
}

/// Emits the pushed transport stream unchanged as one fragment.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughRepackager;

impl Repackager for PassthroughRepackager {
    fn session(&self) -> Box<dyn RepackageSession> {
        Box::new(PassthroughSession::default())
    }

    fn container_extension(&self) -> &str {
        "ts"
    }
}

#[derive(Debug, Default)]
struct PassthroughSession {
    pending: BytesMut,
}

impl RepackageSession for PassthroughSession {
    fn push(&mut self, data: Bytes) -> Result<(), ClipError> {
        self.pending.extend_from_slice(&data);
        Ok(())
    }

    fn flush(&mut self) -> Result<Vec<RepackageEvent>, ClipError> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![RepackageEvent {
            init_segment: None,
            fragment: Some(self.pending.split().freeze()),
        }])
    }
}
