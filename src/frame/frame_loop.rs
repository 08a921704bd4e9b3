// Frame loop / synchronizer
//
// One iteration: acquire -> wait (acquire fence, then the slot fence) ->
// reset both -> submit -> present. The slot fence wait is what keeps the CPU
// from resubmitting a command buffer the GPU is still executing; the acquire
// fence wait keeps it from submitting before the image is really ours.
//
// Slot lifecycle:   Idle --submit--> Submitted --fence wait--> Idle
// Acquire fence:    Free --acquire--> Acquiring --fence wait--> Acquired(i) --submit--> Free

use super::gpu::{AcquireStatus, FenceWait, FrameGpu, PlatformEvents};
use super::resources::FrameResources;
use crate::error::{RenderError, RenderResult};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Fence signaled, command buffer reusable
    Idle,
    /// Fence unsignaled, GPU may be executing
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireState {
    Free,
    Acquiring,
    Acquired(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    Submitted { image_index: u32 },
    /// Acquisition was not ready, nothing was submitted
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub submitted: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// `None` waits forever for the next image
    pub acquire_timeout: Option<Duration>,
    /// `None` waits forever on fences; `Some` turns a stuck GPU into `RenderError::Hung`
    pub fence_timeout: Option<Duration>,
    /// Present each frame. Without it the render-complete semaphore is not signaled.
    pub present: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            acquire_timeout: None,
            fence_timeout: None,
            present: true,
        }
    }
}

pub struct FrameLoop<'a, G: FrameGpu> {
    gpu: &'a G,
    frames: &'a FrameResources<G>,
    settings: LoopSettings,
    slot_states: Vec<SlotState>,
    acquire_state: AcquireState,
    stats: FrameStats,
}

impl<'a, G: FrameGpu> FrameLoop<'a, G> {
    pub fn new(gpu: &'a G, frames: &'a FrameResources<G>, settings: LoopSettings) -> Self {
        Self {
            gpu,
            frames,
            settings,
            slot_states: vec![SlotState::Idle; frames.len()],
            acquire_state: AcquireState::Free,
            stats: FrameStats::default(),
        }
    }

    /// Run until the platform asks to close, then drain the device.
    ///
    /// The device-idle wait happens exactly once on the way out, also when an
    /// iteration failed; in that case the iteration's error is returned.
    pub fn run(&mut self, events: &mut impl PlatformEvents) -> RenderResult<FrameStats> {
        let outcome = self.run_until_close(events);
        let drained = self.drain();

        match (outcome, drained) {
            (Ok(stats), Ok(())) => Ok(stats),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(drain_err)) => {
                log::warn!("Device did not drain after frame loop failure: {}", drain_err);
                Err(e)
            }
        }
    }

    fn run_until_close(&mut self, events: &mut impl PlatformEvents) -> RenderResult<FrameStats> {
        loop {
            // The only cancellation point: an iteration that started always
            // gets as far as its submit.
            if events.poll_close_requested() {
                log::info!(
                    "Close requested after {} frames ({} skipped acquisitions)",
                    self.stats.submitted,
                    self.stats.skipped
                );
                return Ok(self.stats);
            }
            self.step()?;
        }
    }

    /// One acquire -> wait -> submit -> present cycle
    pub fn step(&mut self) -> RenderResult<Iteration> {
        debug_assert_eq!(self.acquire_state, AcquireState::Free);
        let result = self.advance();
        if result.is_err() {
            // A failed iteration never leaves an acquisition outstanding
            self.acquire_state = AcquireState::Free;
        }
        result
    }

    fn advance(&mut self) -> RenderResult<Iteration> {
        let frames = self.frames;
        let acquire_fence = frames.acquire_fence();

        self.acquire_state = AcquireState::Acquiring;
        let status = self.gpu.acquire_next_image(acquire_fence, self.settings.acquire_timeout)?;
        let image_index = match status {
            AcquireStatus::Acquired { index, suboptimal } => {
                if suboptimal {
                    log::debug!("Swapchain image {} is suboptimal for the surface", index);
                }
                index
            }
            AcquireStatus::NotReady => {
                // Nothing was signaled, the fence is still reset.
                self.acquire_state = AcquireState::Free;
                self.stats.skipped += 1;
                log::trace!("No swapchain image ready, skipping iteration");
                return Ok(Iteration::Skipped);
            }
        };

        let slot = frames.slot(image_index)?;
        let slot_index = image_index as usize;

        self.wait_and_reset(acquire_fence, "swapchain image acquisition")?;
        self.acquire_state = AcquireState::Acquired(image_index);

        self.wait_and_reset(&slot.reusable, "frame slot fence")?;
        self.slot_states[slot_index] = SlotState::Idle;

        let signal = self.settings.present.then_some(&slot.render_complete);
        self.gpu.submit(&slot.commands, signal, &slot.reusable)?;
        self.slot_states[slot_index] = SlotState::Submitted;
        self.acquire_state = AcquireState::Free;
        self.stats.submitted += 1;

        if self.settings.present {
            self.gpu.present(image_index, &slot.render_complete)?;
        }

        Ok(Iteration::Submitted { image_index })
    }

    fn wait_and_reset(&self, fence: &G::Fence, what: &'static str) -> RenderResult<()> {
        match self.gpu.wait_for_fence(fence, self.settings.fence_timeout)? {
            FenceWait::Signaled => self.gpu.reset_fence(fence),
            FenceWait::TimedOut => Err(RenderError::Hung {
                what,
                timeout: self.settings.fence_timeout.unwrap_or(Duration::MAX),
            }),
        }
    }

    /// Block until the GPU has finished everything, before anything is released
    fn drain(&mut self) -> RenderResult<()> {
        log::debug!("Waiting for device idle");
        self.gpu.wait_idle()?;
        self.slot_states.fill(SlotState::Idle);
        Ok(())
    }

    pub fn slot_states(&self) -> &[SlotState] {
        &self.slot_states
    }

    pub fn acquire_state(&self) -> AcquireState {
        self.acquire_state
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::mock::{Call, CloseAfter, MockCommands, MockGpu, ScriptedAcquire};
    use ash::vk;

    fn triple_buffered() -> (MockGpu, Vec<MockCommands>) {
        let gpu = MockGpu::new(3);
        let buffers = gpu.command_buffers(3);
        (gpu, buffers)
    }

    #[test]
    fn ten_iterations_submit_ten_times_then_drain_once() {
        let (gpu, buffers) = triple_buffered();
        let frames = FrameResources::new(&gpu, buffers).unwrap();
        let mut frame_loop = FrameLoop::new(&gpu, &frames, LoopSettings::default());

        let stats = frame_loop.run(&mut CloseAfter::new(10)).unwrap();

        assert_eq!(stats, FrameStats { submitted: 10, skipped: 0 });
        assert_eq!(gpu.count(|call| matches!(call, Call::Submit { .. })), 10);
        assert_eq!(gpu.count(|call| *call == Call::WaitIdle), 1);
        assert_eq!(gpu.calls().last(), Some(&Call::WaitIdle));

        // Images cycle 0, 1, 2, 0, ... so slot 0 gets four frames.
        let submitted: Vec<usize> = frames.slots().iter().map(|s| gpu.submissions(&s.commands)).collect();
        assert_eq!(submitted, vec![4, 3, 3]);
    }

    #[test]
    fn every_submit_follows_a_wait_and_reset_of_its_fences() {
        let (gpu, buffers) = triple_buffered();
        let frames = FrameResources::new(&gpu, buffers).unwrap();
        let acquire_fence = frames.acquire_fence().0;
        FrameLoop::new(&gpu, &frames, LoopSettings::default())
            .run(&mut CloseAfter::new(10))
            .unwrap();

        let calls = gpu.calls();
        let mut iteration_start = 0;
        for (at, call) in calls.iter().enumerate() {
            let Call::Submit { fence, .. } = call else {
                continue;
            };
            let iteration = &calls[iteration_start..at];
            let once = |wanted: Call| iteration.iter().filter(|c| **c == wanted).count() == 1;
            assert!(once(Call::WaitFence(acquire_fence)));
            assert!(once(Call::ResetFence(acquire_fence)));
            assert!(once(Call::WaitFence(*fence)));
            assert!(once(Call::ResetFence(*fence)));

            let wait = iteration.iter().position(|c| *c == Call::WaitFence(*fence)).unwrap();
            let reset = iteration.iter().position(|c| *c == Call::ResetFence(*fence)).unwrap();
            assert!(wait < reset);
            iteration_start = at + 1;
        }
    }

    #[test]
    fn close_during_fourth_iteration_lets_it_submit() {
        let (gpu, buffers) = triple_buffered();
        let frames = FrameResources::new(&gpu, buffers).unwrap();
        let mut events = CloseAfter::new(4);

        let result = FrameLoop::new(&gpu, &frames, LoopSettings::default()).run(&mut events);

        assert_eq!(result.unwrap().submitted, 4);
        assert_eq!(events.polls(), 5);
        assert_eq!(gpu.count(|call| *call == Call::WaitIdle), 1);
        let last_submit = gpu
            .calls()
            .iter()
            .rposition(|call| matches!(call, Call::Submit { .. }))
            .unwrap();
        let idle = gpu.calls().iter().position(|call| *call == Call::WaitIdle).unwrap();
        assert!(last_submit < idle);
    }

    #[test]
    fn command_buffer_is_never_recordable_and_executing_at_once() {
        let (gpu, buffers) = triple_buffered();
        let frames = FrameResources::new(&gpu, buffers).unwrap();
        let mut frame_loop = FrameLoop::new(&gpu, &frames, LoopSettings::default());

        for _ in 0..12 {
            frame_loop.step().unwrap();
            for (slot, state) in frames.slots().iter().zip(frame_loop.slot_states()) {
                let recordable = gpu.is_signaled(&slot.reusable);
                let executing = gpu.is_executing(&slot.commands);
                assert!(!(recordable && executing));
                assert_eq!(*state == SlotState::Submitted, executing);
            }
            assert_eq!(frame_loop.acquire_state(), AcquireState::Free);
        }
    }

    #[test]
    fn acquire_fence_is_consumed_before_every_acquire() {
        let (gpu, buffers) = triple_buffered();
        gpu.script_acquire([ScriptedAcquire::NotReady]);
        let frames = FrameResources::new(&gpu, buffers).unwrap();
        let acquire_fence = frames.acquire_fence().0;
        let mut frame_loop = FrameLoop::new(&gpu, &frames, LoopSettings::default());

        for _ in 0..8 {
            frame_loop.step().unwrap();
            // Between iterations the shared fence is always back to reset.
            assert!(!gpu.is_signaled(frames.acquire_fence()));
        }

        // Every successful acquisition is waited on and reset before the next acquire.
        let calls = gpu.calls();
        let acquires: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, call)| matches!(call, Call::Acquire { .. }))
            .map(|(at, _)| at)
            .collect();
        assert_eq!(acquires.len(), 8);
        for pair in acquires.windows(2) {
            let Call::Acquire { image, .. } = &calls[pair[0]] else { unreachable!() };
            let between = &calls[pair[0]..pair[1]];
            let resets = between.iter().filter(|c| **c == Call::ResetFence(acquire_fence)).count();
            assert_eq!(resets, usize::from(image.is_some()));
        }
    }

    #[test]
    fn exhausted_swapchain_is_transient() {
        let gpu = MockGpu::with_available(Vec::new());
        let frames = FrameResources::new(&gpu, gpu.command_buffers(3)).unwrap();
        let settings = LoopSettings {
            acquire_timeout: Some(Duration::ZERO),
            ..LoopSettings::default()
        };
        let mut frame_loop = FrameLoop::new(&gpu, &frames, settings);

        assert_eq!(frame_loop.step().unwrap(), Iteration::Skipped);
        assert_eq!(frame_loop.step().unwrap(), Iteration::Skipped);
        assert_eq!(frame_loop.stats(), FrameStats { submitted: 0, skipped: 2 });
        assert_eq!(gpu.count(|call| matches!(call, Call::Submit { .. })), 0);
        assert_eq!(frame_loop.acquire_state(), AcquireState::Free);
    }

    #[test]
    fn not_ready_skips_then_recovers() {
        let (gpu, buffers) = triple_buffered();
        gpu.script_acquire([ScriptedAcquire::NotReady, ScriptedAcquire::NotReady]);
        let frames = FrameResources::new(&gpu, buffers).unwrap();

        let stats = FrameLoop::new(&gpu, &frames, LoopSettings::default())
            .run(&mut CloseAfter::new(5))
            .unwrap();

        assert_eq!(stats, FrameStats { submitted: 3, skipped: 2 });
    }

    #[test]
    fn acquire_error_is_fatal_and_still_drains() {
        let (gpu, buffers) = triple_buffered();
        let frames = FrameResources::new(&gpu, buffers).unwrap();
        let mut frame_loop = FrameLoop::new(&gpu, &frames, LoopSettings::default());
        frame_loop.step().unwrap();
        gpu.script_acquire([ScriptedAcquire::Fail(vk::Result::ERROR_SURFACE_LOST_KHR)]);

        match frame_loop.run(&mut CloseAfter::new(10)) {
            Err(RenderError::Acquire(vk::Result::ERROR_SURFACE_LOST_KHR)) => {}
            other => panic!("unexpected loop result: {:?}", other),
        }
        assert_eq!(gpu.count(|call| matches!(call, Call::Submit { .. })), 1);
        assert_eq!(gpu.count(|call| *call == Call::WaitIdle), 1);
        assert!(frame_loop.slot_states().iter().all(|s| *s == SlotState::Idle));
    }

    #[test]
    fn device_lost_on_acquire_keeps_its_kind() {
        let (gpu, buffers) = triple_buffered();
        gpu.script_acquire([ScriptedAcquire::Fail(vk::Result::ERROR_DEVICE_LOST)]);
        let frames = FrameResources::new(&gpu, buffers).unwrap();

        let result = FrameLoop::new(&gpu, &frames, LoopSettings::default()).step();
        assert!(matches!(result, Err(RenderError::DeviceLost)));
    }

    #[test]
    fn bounded_wait_turns_a_hung_gpu_into_an_error() {
        let (gpu, buffers) = triple_buffered();
        let frames = FrameResources::new(&gpu, buffers).unwrap();
        let settings = LoopSettings {
            fence_timeout: Some(Duration::from_millis(16)),
            ..LoopSettings::default()
        };
        let mut frame_loop = FrameLoop::new(&gpu, &frames, settings);

        // Fill every slot, then stop the GPU: the fourth frame reuses slot 0.
        for _ in 0..3 {
            frame_loop.step().unwrap();
        }
        gpu.hang();

        match frame_loop.step() {
            Err(RenderError::Hung { what, timeout }) => {
                assert_eq!(what, "frame slot fence");
                assert_eq!(timeout, Duration::from_millis(16));
            }
            other => panic!("unexpected step result: {:?}", other),
        }
        assert_eq!(gpu.count(|call| matches!(call, Call::Submit { .. })), 3);
    }

    #[test]
    fn failed_iteration_frees_the_acquire_state() {
        let (gpu, buffers) = triple_buffered();
        let frames = FrameResources::new(&gpu, buffers).unwrap();
        let settings = LoopSettings {
            fence_timeout: Some(Duration::from_millis(1)),
            ..LoopSettings::default()
        };
        let mut frame_loop = FrameLoop::new(&gpu, &frames, settings);
        for _ in 0..3 {
            frame_loop.step().unwrap();
        }
        gpu.hang();

        // Image 0 was acquired, then its slot fence timed out.
        assert!(matches!(frame_loop.step(), Err(RenderError::Hung { .. })));
        assert_eq!(frame_loop.acquire_state(), AcquireState::Free);

        // Stepping again reports the next stuck slot instead of tripping over stale state.
        assert!(matches!(frame_loop.step(), Err(RenderError::Hung { what: "frame slot fence", .. })));
        assert_eq!(frame_loop.acquire_state(), AcquireState::Free);
    }

    #[test]
    fn without_present_no_semaphore_is_signaled() {
        let (gpu, buffers) = triple_buffered();
        let frames = FrameResources::new(&gpu, buffers).unwrap();
        // Nothing is handed back, so acquisition needs a bound to make progress.
        let settings = LoopSettings {
            acquire_timeout: Some(Duration::ZERO),
            present: false,
            ..LoopSettings::default()
        };

        // Nothing hands images back, so only three acquisitions succeed.
        let stats = FrameLoop::new(&gpu, &frames, settings)
            .run(&mut CloseAfter::new(5))
            .unwrap();

        assert_eq!(stats, FrameStats { submitted: 3, skipped: 2 });
        assert_eq!(gpu.count(|call| matches!(call, Call::Present { .. })), 0);
        assert_eq!(gpu.count(|call| matches!(call, Call::Submit { semaphore: Some(_), .. })), 0);
    }

    #[test]
    #[should_panic(expected = "unbounded acquire")]
    fn without_present_an_unbounded_acquire_never_returns() {
        let (gpu, buffers) = triple_buffered();
        let frames = FrameResources::new(&gpu, buffers).unwrap();
        let settings = LoopSettings { present: false, ..LoopSettings::default() };

        let _ = FrameLoop::new(&gpu, &frames, settings).run(&mut CloseAfter::new(4));
    }

    #[test]
    fn present_waits_on_the_slot_semaphore() {
        let (gpu, buffers) = triple_buffered();
        let frames = FrameResources::new(&gpu, buffers).unwrap();
        let mut frame_loop = FrameLoop::new(&gpu, &frames, LoopSettings::default());

        let Iteration::Submitted { image_index } = frame_loop.step().unwrap() else {
            panic!("first iteration skipped");
        };
        let semaphore = frames.slot(image_index).unwrap().render_complete.0;

        let calls = gpu.calls();
        let n = calls.len();
        assert_eq!(calls[n - 1], Call::Present { image: image_index, semaphore });
        assert!(matches!(calls[n - 2], Call::Submit { semaphore: Some(s), .. } if s == semaphore));
    }
}
