//! Indexed multi-wait over the profiler's wait sources
//!
//! The source list is an ordered `Vec`; a wait reports which source fired.
//! Sources come and go between waits (the debuggee only exists during a
//! session). Signals already pending on other sources are left to the
//! platform and picked up by a later wait.

use std::time::Duration;

use log::trace;

use crate::domain::PlatformError;
use crate::platform::{Platform, PlatformResult, WaitSource};

#[derive(Debug, Default)]
pub struct EventChannel {
    sources: Vec<WaitSource>,
}

impl EventChannel {
    #[must_use]
    pub fn new(sources: &[WaitSource]) -> Self {
        let mut channel = Self::default();
        for &source in sources {
            channel.add(source);
        }
        channel
    }

    /// Register a source; registering it twice has no effect.
    pub fn add(&mut self, source: WaitSource) {
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }

    /// Unregister a source, returning whether it was registered.
    pub fn remove(&mut self, source: WaitSource) -> bool {
        let before = self.sources.len();
        self.sources.retain(|&s| s != source);
        self.sources.len() != before
    }

    #[must_use]
    pub fn sources(&self) -> &[WaitSource] {
        &self.sources
    }

    /// Block until a registered source is signaled.
    ///
    /// # Errors
    /// The platform's wait failure, or [`PlatformError::UnknownSource`] if it
    /// reports an index outside the registered list
    pub fn wait_next<P: Platform + ?Sized>(
        &self,
        platform: &mut P,
        timeout: Option<Duration>,
    ) -> PlatformResult<WaitSource> {
        let index = platform.wait_any(&self.sources, timeout)?;
        let source = self
            .sources
            .get(index)
            .copied()
            .ok_or(PlatformError::UnknownSource(index))?;
        trace!("woke on {source}");
        Ok(source)
    }
}
