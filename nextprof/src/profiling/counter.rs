//! # Performance Counter Controller
//!
//! Drives the core cycle counter so that it overflows once per sampling
//! period. The counter counts up from `-period`; the overflow interrupt
//! signals [`WaitSource::CounterOverflow`](crate::platform::WaitSource).
//!
//! Exactly one overflow may be pending at a time. The counter is reloaded
//! with [`CounterController::reset_and_rearm`] when a session attaches and
//! after every sample batch, never in between.
//!
//! Every failure here is fatal: sampling cannot continue without the counter.

use log::{debug, trace};

use crate::domain::{PlatformResultExt, ProfilerError};
use crate::platform::{CounterEvent, CounterOp, Platform};

#[derive(Debug)]
pub struct CounterController {
    period: u64,
    acquired: bool,
    armed: bool,
}

impl CounterController {
    #[must_use]
    pub fn new(period: u64) -> Self {
        Self {
            period,
            acquired: false,
            armed: false,
        }
    }

    #[must_use]
    pub fn period(&self) -> u64 {
        self.period
    }

    #[must_use]
    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Whether an overflow is expected before the next rearm.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Take control of the counter, route its overflow to the wait source
    /// and start the first period.
    ///
    /// # Errors
    /// [`ProfilerError::Platform`] naming the step that failed
    pub fn acquire<P: Platform + ?Sized>(&mut self, platform: &mut P) -> Result<(), ProfilerError> {
        platform
            .clear_overflow_event()
            .fatal("Clearing perf counter overflow event")?;
        platform
            .control_counter(CounterOp::Enable)
            .fatal("PMC acquire control")?;
        self.acquired = true;
        platform
            .control_counter(CounterOp::SetVirtualCounter(false))
            .fatal("PMC use virtual counter")?;
        platform
            .bind_overflow_interrupt()
            .fatal("Binding perf counter interrupt")?;
        platform
            .clear_overflow_event()
            .fatal("Clearing perf counter overflow event")?;
        platform
            .control_counter(CounterOp::SetEvent(CounterEvent::CoreCycleCount))
            .fatal("PMC set interrupt")?;
        debug!("Perf counter acquired, period {} cycles", self.period);
        self.reset_and_rearm(platform)
    }

    /// Unbind the overflow interrupt and give up control of the counter.
    ///
    /// # Errors
    /// [`ProfilerError::Platform`] naming the step that failed
    pub fn release<P: Platform + ?Sized>(&mut self, platform: &mut P) -> Result<(), ProfilerError> {
        if !self.acquired {
            return Ok(());
        }
        platform
            .unbind_overflow_interrupt()
            .fatal("Unbinding perf counter interrupt")?;
        platform
            .control_counter(CounterOp::Disable)
            .fatal("PMC release control")?;
        self.acquired = false;
        self.armed = false;
        Ok(())
    }

    /// Change the period and start a new one.
    ///
    /// # Errors
    /// [`ProfilerError::Platform`] if the counter cannot be reloaded
    pub fn arm<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
        period: u64,
    ) -> Result<(), ProfilerError> {
        self.period = period;
        self.reset_and_rearm(platform)
    }

    /// Stop the counter without reloading it.
    ///
    /// # Errors
    /// [`ProfilerError::Platform`] if the reset fails
    pub fn disarm<P: Platform + ?Sized>(&mut self, platform: &mut P) -> Result<(), ProfilerError> {
        platform
            .control_counter(CounterOp::Reset)
            .fatal("PMC reset")?;
        self.armed = false;
        Ok(())
    }

    /// Zero the counter and load it so it overflows after one period.
    ///
    /// # Errors
    /// [`ProfilerError::Platform`] if the reset or reload fails
    pub fn reset_and_rearm<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
    ) -> Result<(), ProfilerError> {
        platform
            .control_counter(CounterOp::Reset)
            .fatal("PMC reset")?;
        platform
            .control_counter(CounterOp::SetValue(self.period.wrapping_neg()))
            .fatal("PMC reset interrupt")?;
        self.armed = true;
        trace!("Perf counter rearmed");
        Ok(())
    }

    /// Acknowledge an overflow. The counter stays quiet until rearmed.
    ///
    /// # Errors
    /// [`ProfilerError::Platform`] if the overflow event cannot be cleared
    pub fn on_overflow<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
    ) -> Result<(), ProfilerError> {
        platform
            .clear_overflow_event()
            .fatal("Clearing perf counter overflow event")?;
        self.armed = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sim::SimPlatform;
    use crate::platform::WaitSource;

    #[test]
    fn test_acquire_sequence() {
        let mut sim = SimPlatform::new();
        let mut counter = CounterController::new(10_000_000);
        counter.acquire(&mut sim).unwrap();

        assert_eq!(
            sim.counter_log(),
            &[
                CounterOp::Enable,
                CounterOp::SetVirtualCounter(false),
                CounterOp::SetEvent(CounterEvent::CoreCycleCount),
                CounterOp::Reset,
                CounterOp::SetValue(10_000_000u64.wrapping_neg()),
            ]
        );
        assert!(sim.interrupt_bound());
        assert!(sim.counter_armed());
        assert!(counter.is_armed());
    }

    #[test]
    fn test_one_overflow_per_arm() {
        let mut sim = SimPlatform::new();
        let mut counter = CounterController::new(1000);
        counter.acquire(&mut sim).unwrap();

        let sources = [WaitSource::CounterOverflow];
        assert_eq!(sim.wait_any(&sources, None), Ok(0));
        counter.on_overflow(&mut sim).unwrap();
        assert!(!counter.is_armed());
        assert!(sim.wait_any(&sources, None).is_err());

        counter.reset_and_rearm(&mut sim).unwrap();
        assert_eq!(sim.wait_any(&sources, None), Ok(0));
        assert_eq!(sim.overflow_count(), 2);
    }

    #[test]
    fn test_disarm_and_release() {
        let mut sim = SimPlatform::new();
        let mut counter = CounterController::new(1000);
        counter.acquire(&mut sim).unwrap();
        counter.disarm(&mut sim).unwrap();
        assert!(!sim.counter_armed());

        counter.arm(&mut sim, 500).unwrap();
        assert_eq!(counter.period(), 500);
        assert_eq!(
            sim.counter_log().last(),
            Some(&CounterOp::SetValue(500u64.wrapping_neg()))
        );

        counter.release(&mut sim).unwrap();
        assert!(!sim.interrupt_bound());
        assert!(!sim.counter_enabled());
        // Releasing twice is harmless
        counter.release(&mut sim).unwrap();
    }

    #[test]
    fn test_acquire_failure_is_fatal() {
        let mut sim = SimPlatform::new();
        sim.bind_overflow_interrupt().unwrap();
        let mut counter = CounterController::new(1000);
        let err = counter.acquire(&mut sim).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Binding perf counter interrupt failed"));
    }
}
