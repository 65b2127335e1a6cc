use crate::{GfxError, GfxResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandBufferState {
    Initial,
    Recording,
    Executable,
}

/// Records commands against the frame's command allocator.
///
/// The frame orchestrator hands one of these out per frame; it is valid
/// only until the `present` that ends the frame, at which point its
/// backing allocator is discarded back to the pool.
pub struct CommandBuffer {
    state: CommandBufferState,
    command_count: u64,
}

impl CommandBuffer {
    pub(crate) fn new() -> Self {
        Self {
            state: CommandBufferState::Initial,
            command_count: 0,
        }
    }

    pub fn begin(&mut self) -> GfxResult<()> {
        if self.state == CommandBufferState::Recording {
            return Err(GfxError::ValidationFailure(
                "begin on a command buffer already recording".to_string(),
            ));
        }
        self.state = CommandBufferState::Recording;
        self.command_count = 0;
        Ok(())
    }

    pub fn end(&mut self) -> GfxResult<()> {
        if self.state != CommandBufferState::Recording {
            return Err(GfxError::ValidationFailure(
                "end on a command buffer that is not recording".to_string(),
            ));
        }
        self.state = CommandBufferState::Executable;
        Ok(())
    }

    /// Records a labeled marker. Stands in for real command recording in
    /// the software backend; each call is one GPU command.
    pub fn cmd_debug_marker(&mut self, _label: &str) -> GfxResult<()> {
        if self.state != CommandBufferState::Recording {
            return Err(GfxError::ValidationFailure(
                "recording into a command buffer outside begin/end".to_string(),
            ));
        }
        self.command_count += 1;
        Ok(())
    }

    pub(crate) fn command_count(&self) -> u64 {
        self.command_count
    }

    pub(crate) fn is_executable(&self) -> bool {
        self.state == CommandBufferState::Executable
    }

    pub(crate) fn is_recording(&self) -> bool {
        self.state == CommandBufferState::Recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_lifecycle() {
        let mut command_buffer = CommandBuffer::new();
        assert!(command_buffer.cmd_debug_marker("early").is_err());

        command_buffer.begin().unwrap();
        command_buffer.cmd_debug_marker("a").unwrap();
        command_buffer.cmd_debug_marker("b").unwrap();
        assert!(command_buffer.begin().is_err());
        command_buffer.end().unwrap();

        assert!(command_buffer.is_executable());
        assert_eq!(command_buffer.command_count(), 2);
        assert!(command_buffer.cmd_debug_marker("late").is_err());
        assert!(command_buffer.end().is_err());
    }

    #[test]
    fn begin_resets_the_command_count() {
        let mut command_buffer = CommandBuffer::new();
        command_buffer.begin().unwrap();
        command_buffer.cmd_debug_marker("a").unwrap();
        command_buffer.end().unwrap();

        command_buffer.begin().unwrap();
        assert_eq!(command_buffer.command_count(), 0);
        command_buffer.end().unwrap();
    }
}
