//! Simulated GPU for exercising the frame core without a driver.
//!
//! Submitted work stays in flight until the CPU waits on its fence (or the
//! device idles), which is the earliest point a real GPU is guaranteed to be
//! done with it. Every misuse a validation layer would flag panics here.

use super::gpu::{AcquireStatus, FenceWait, FrameGpu, PlatformEvents, UploadGpu};
use crate::error::{RenderError, RenderResult};
use ash::vk;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateFence { fence: usize, signaled: bool },
    Acquire { fence: usize, image: Option<u32> },
    WaitFence(usize),
    ResetFence(usize),
    Submit { commands: usize, semaphore: Option<usize>, fence: usize },
    Present { image: u32, semaphore: usize },
    WaitIdle,
    Write(String),
    Flush(String),
    /// A host write barrier finished executing on the GPU timeline
    Barrier,
    Read(String),
}

/// Overrides for upcoming acquire calls, consumed in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedAcquire {
    NotReady,
    Fail(vk::Result),
}

#[derive(Debug)]
pub struct MockFence(pub usize);
#[derive(Debug)]
pub struct MockSemaphore(pub usize);
#[derive(Debug)]
pub struct MockCommands(pub usize);
#[derive(Debug)]
pub struct MockBuffer(pub usize);

#[derive(Default)]
struct FenceState {
    signaled: bool,
    pending: Option<usize>,
}

#[derive(PartialEq, Eq)]
enum CommandKind {
    Frame,
    HostBarrier,
}

struct CommandState {
    kind: CommandKind,
    executing: bool,
    submissions: usize,
}

/// Host view, flushed view and device view of one mapped buffer
struct Memory {
    label: String,
    host: Vec<u8>,
    flushed: Vec<u8>,
    device: Vec<u8>,
}

struct State {
    fences: Vec<FenceState>,
    semaphores: Vec<bool>,
    commands: Vec<CommandState>,
    memory: Vec<Memory>,
    images: VecDeque<u32>,
    script: VecDeque<ScriptedAcquire>,
    hung: bool,
    calls: Vec<Call>,
}

impl State {
    fn complete(&mut self, fence: usize) {
        let Some(commands) = self.fences[fence].pending.take() else {
            return;
        };
        let state = &mut self.commands[commands];
        state.executing = false;
        if state.kind == CommandKind::HostBarrier {
            for memory in &mut self.memory {
                memory.device = memory.flushed.clone();
            }
            self.calls.push(Call::Barrier);
        }
        self.fences[fence].signaled = true;
    }
}

pub struct MockGpu {
    state: RefCell<State>,
}

impl MockGpu {
    /// A swapchain whose images are all available, in index order
    pub fn new(image_count: u32) -> Self {
        Self::with_available(0..image_count)
    }

    pub fn with_available(images: impl IntoIterator<Item = u32>) -> Self {
        Self {
            state: RefCell::new(State {
                fences: Vec::new(),
                semaphores: Vec::new(),
                commands: Vec::new(),
                memory: Vec::new(),
                images: images.into_iter().collect(),
                script: VecDeque::new(),
                hung: false,
                calls: Vec::new(),
            }),
        }
    }

    /// Command buffers standing in for prerecorded frame commands
    pub fn command_buffers(&self, count: usize) -> Vec<MockCommands> {
        let mut state = self.state.borrow_mut();
        (0..count)
            .map(|_| {
                state.commands.push(CommandState {
                    kind: CommandKind::Frame,
                    executing: false,
                    submissions: 0,
                });
                MockCommands(state.commands.len() - 1)
            })
            .collect()
    }

    pub fn script_acquire(&self, outcomes: impl IntoIterator<Item = ScriptedAcquire>) {
        self.state.borrow_mut().script.extend(outcomes);
    }

    /// Submitted work never finishes from here on
    pub fn hang(&self) {
        self.state.borrow_mut().hung = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|call| matches(call)).count()
    }

    pub fn is_signaled(&self, fence: &MockFence) -> bool {
        self.state.borrow().fences[fence.0].signaled
    }

    pub fn is_executing(&self, commands: &MockCommands) -> bool {
        self.state.borrow().commands[commands.0].executing
    }

    pub fn submissions(&self, commands: &MockCommands) -> usize {
        self.state.borrow().commands[commands.0].submissions
    }

    /// What a vertex fetch would see right now
    pub fn gpu_read(&self, buffer: &MockBuffer) -> Vec<u8> {
        let mut state = self.state.borrow_mut();
        let label = state.memory[buffer.0].label.clone();
        state.calls.push(Call::Read(label));
        state.memory[buffer.0].device.clone()
    }
}

impl FrameGpu for MockGpu {
    type Fence = MockFence;
    type Semaphore = MockSemaphore;
    type CommandBuffer = MockCommands;

    fn create_fence(&self, signaled: bool) -> RenderResult<MockFence> {
        let mut state = self.state.borrow_mut();
        state.fences.push(FenceState { signaled, pending: None });
        let fence = state.fences.len() - 1;
        state.calls.push(Call::CreateFence { fence, signaled });
        Ok(MockFence(fence))
    }

    fn create_semaphore(&self) -> RenderResult<MockSemaphore> {
        let mut state = self.state.borrow_mut();
        state.semaphores.push(false);
        Ok(MockSemaphore(state.semaphores.len() - 1))
    }

    fn acquire_next_image(
        &self,
        signal: &MockFence,
        timeout: Option<Duration>,
    ) -> RenderResult<AcquireStatus> {
        let mut state = self.state.borrow_mut();
        let fence = &state.fences[signal.0];
        assert!(
            !fence.signaled && fence.pending.is_none(),
            "acquire fence {} reused before it was waited on and reset",
            signal.0
        );

        match state.script.pop_front() {
            Some(ScriptedAcquire::NotReady) => {
                state.calls.push(Call::Acquire { fence: signal.0, image: None });
                return Ok(AcquireStatus::NotReady);
            }
            Some(ScriptedAcquire::Fail(result)) => {
                return Err(match result {
                    vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
                    result => RenderError::Acquire(result),
                });
            }
            None => {}
        }

        let image = state.images.pop_front();
        // Only presentation hands images back, so this would block forever
        assert!(
            image.is_some() || timeout.is_some(),
            "unbounded acquire with every image held by the application"
        );
        state.calls.push(Call::Acquire { fence: signal.0, image });
        match image {
            Some(index) => {
                state.fences[signal.0].signaled = true;
                Ok(AcquireStatus::Acquired { index, suboptimal: false })
            }
            None => Ok(AcquireStatus::NotReady),
        }
    }

    fn wait_for_fence(&self, fence: &MockFence, timeout: Option<Duration>) -> RenderResult<FenceWait> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::WaitFence(fence.0));
        if !state.hung {
            state.complete(fence.0);
        }
        if state.fences[fence.0].signaled {
            return Ok(FenceWait::Signaled);
        }
        match timeout {
            Some(_) => Ok(FenceWait::TimedOut),
            None => panic!("unbounded wait on fence {} that nothing will signal", fence.0),
        }
    }

    fn reset_fence(&self, fence: &MockFence) -> RenderResult<()> {
        let mut state = self.state.borrow_mut();
        let fence_state = &mut state.fences[fence.0];
        assert!(fence_state.pending.is_none(), "fence {} reset while its work is in flight", fence.0);
        fence_state.signaled = false;
        state.calls.push(Call::ResetFence(fence.0));
        Ok(())
    }

    fn submit(
        &self,
        commands: &MockCommands,
        signal: Option<&MockSemaphore>,
        fence: &MockFence,
    ) -> RenderResult<()> {
        let mut state = self.state.borrow_mut();
        let fence_state = &state.fences[fence.0];
        assert!(
            !fence_state.signaled && fence_state.pending.is_none(),
            "fence {} must be reset before it is submitted",
            fence.0
        );
        assert!(
            !state.commands[commands.0].executing,
            "command buffer {} resubmitted while still executing",
            commands.0
        );
        if let Some(semaphore) = signal {
            assert!(
                !state.semaphores[semaphore.0],
                "semaphore {} signaled again before anything waited on it",
                semaphore.0
            );
            state.semaphores[semaphore.0] = true;
        }

        let command_state = &mut state.commands[commands.0];
        command_state.executing = true;
        command_state.submissions += 1;
        state.fences[fence.0].pending = Some(commands.0);
        state.calls.push(Call::Submit {
            commands: commands.0,
            semaphore: signal.map(|s| s.0),
            fence: fence.0,
        });
        Ok(())
    }

    fn present(&self, image_index: u32, wait: &MockSemaphore) -> RenderResult<()> {
        let mut state = self.state.borrow_mut();
        assert!(state.semaphores[wait.0], "present waits on semaphore {} that will never signal", wait.0);
        state.semaphores[wait.0] = false;
        state.images.push_back(image_index);
        state.calls.push(Call::Present { image: image_index, semaphore: wait.0 });
        Ok(())
    }

    fn wait_idle(&self) -> RenderResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::WaitIdle);
        let in_flight: Vec<usize> = (0..state.fences.len())
            .filter(|&fence| state.fences[fence].pending.is_some())
            .collect();
        if state.hung && !in_flight.is_empty() {
            return Err(RenderError::DeviceLost);
        }
        for fence in in_flight {
            state.complete(fence);
        }
        Ok(())
    }
}

impl UploadGpu for MockGpu {
    type Buffer = MockBuffer;

    fn create_host_buffer(&self, label: &str, size: u64) -> RenderResult<MockBuffer> {
        let mut state = self.state.borrow_mut();
        let size = size as usize;
        state.memory.push(Memory {
            label: label.to_string(),
            host: vec![0; size],
            flushed: vec![0; size],
            device: vec![0; size],
        });
        Ok(MockBuffer(state.memory.len() - 1))
    }

    fn write_mapped(&self, buffer: &mut MockBuffer, bytes: &[u8]) -> RenderResult<()> {
        let mut state = self.state.borrow_mut();
        let memory = &mut state.memory[buffer.0];
        assert!(bytes.len() <= memory.host.len(), "write past the end of {}", memory.label);
        memory.host[..bytes.len()].copy_from_slice(bytes);
        let label = memory.label.clone();
        state.calls.push(Call::Write(label));
        Ok(())
    }

    fn flush_mapped(&self, buffer: &MockBuffer) -> RenderResult<()> {
        let mut state = self.state.borrow_mut();
        let memory = &mut state.memory[buffer.0];
        memory.flushed = memory.host.clone();
        let label = memory.label.clone();
        state.calls.push(Call::Flush(label));
        Ok(())
    }

    fn record_host_write_barrier(&self) -> RenderResult<MockCommands> {
        let mut state = self.state.borrow_mut();
        state.commands.push(CommandState {
            kind: CommandKind::HostBarrier,
            executing: false,
            submissions: 0,
        });
        Ok(MockCommands(state.commands.len() - 1))
    }
}

/// Platform that reports a close request after `iterations` loop iterations
pub struct CloseAfter {
    iterations: usize,
    polls: usize,
}

impl CloseAfter {
    pub fn new(iterations: usize) -> Self {
        Self { iterations, polls: 0 }
    }

    pub fn polls(&self) -> usize {
        self.polls
    }
}

impl PlatformEvents for CloseAfter {
    fn poll_close_requested(&mut self) -> bool {
        self.polls += 1;
        self.polls > self.iterations
    }
}
