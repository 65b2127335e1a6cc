use crate::backends::BackendQueue;
use crate::{
    CommandBuffer, DeviceContext, Fence, GfxError, GfxResult, PresentResult, Swapchain,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QueueType {
    Graphics,
    Compute,
    Transfer,
}

/// Submission queue. Work submitted here executes in order on the backend
/// timeline; fences signaled through a queue complete in submission order.
pub struct Queue {
    device_context: DeviceContext,
    queue_type: QueueType,
    backend_queue: BackendQueue,
    /// Reserved for `wait_for_queue_idle`.
    idle_fence: Fence,
}

impl Queue {
    pub(crate) fn new(device_context: &DeviceContext, queue_type: QueueType) -> Self {
        Self {
            device_context: device_context.clone(),
            queue_type,
            backend_queue: BackendQueue::new(device_context.backend_device_context(), queue_type),
            idle_fence: Fence::new(device_context.backend_device_context()),
        }
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    pub fn device_context(&self) -> &DeviceContext {
        &self.device_context
    }

    fn latch_on_loss<T>(&self, result: GfxResult<T>) -> GfxResult<T> {
        if matches!(result, Err(GfxError::DeviceLost)) {
            self.device_context.mark_device_lost();
        }
        result
    }

    /// Submits `command_buffers` for execution, optionally scheduling a
    /// signal of `signal_fence` to a fresh value once they complete.
    pub fn submit(
        &self,
        command_buffers: &[&CommandBuffer],
        signal_fence: Option<&Fence>,
    ) -> GfxResult<()> {
        for command_buffer in command_buffers {
            if !command_buffer.is_executable() {
                return Err(GfxError::ValidationFailure(
                    "submitting a command buffer that was not ended".to_string(),
                ));
            }
        }
        let command_count = command_buffers
            .iter()
            .map(|command_buffer| command_buffer.command_count())
            .sum();

        self.latch_on_loss(self.backend_queue.submit(command_count))?;
        if let Some(fence) = signal_fence {
            self.signal(fence)?;
        }
        Ok(())
    }

    /// Schedules a signal of `fence` to its next value and returns that
    /// value.
    pub fn signal(&self, fence: &Fence) -> GfxResult<u64> {
        let value = fence.next_value();
        self.latch_on_loss(
            self.backend_queue
                .signal(fence.backend_fence.completion(), value),
        )?;
        Ok(value)
    }

    /// Presents the swapchain's current image. `Suboptimal` asks the
    /// caller to rebuild the swapchain at its leisure.
    pub fn present(&self, swapchain: &Swapchain) -> GfxResult<PresentResult> {
        self.latch_on_loss(self.backend_queue.present(swapchain.backend_swapchain()))
    }

    /// Blocks until everything submitted to this queue so far has
    /// executed.
    pub fn wait_for_queue_idle(&self) -> GfxResult<()> {
        let value = self.signal(&self.idle_fence)?;
        self.idle_fence.wait(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApiDef, GfxApi};

    #[test]
    fn queue_idle_wait_retires_submitted_work() {
        let api = GfxApi::new(&ApiDef::default()).unwrap();
        let device_context = api.device_context();
        let queue = device_context.create_queue(QueueType::Graphics);

        let mut command_buffer = CommandBuffer::new();
        command_buffer.begin().unwrap();
        command_buffer.cmd_debug_marker("work").unwrap();
        command_buffer.end().unwrap();

        let fence = device_context.create_fence();
        queue.submit(&[&command_buffer], Some(&fence)).unwrap();
        assert_eq!(fence.submitted_value(), 1);

        queue.wait_for_queue_idle().unwrap();
        assert_eq!(fence.poll(), 1);
    }

    #[test]
    fn unended_command_buffer_is_rejected() {
        let api = GfxApi::new(&ApiDef::default()).unwrap();
        let queue = api.device_context().create_queue(QueueType::Graphics);

        let mut command_buffer = CommandBuffer::new();
        command_buffer.begin().unwrap();
        assert!(matches!(
            queue.submit(&[&command_buffer], None),
            Err(GfxError::ValidationFailure(_))
        ));
    }
}
