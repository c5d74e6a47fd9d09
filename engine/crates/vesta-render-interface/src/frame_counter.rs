use vesta_gfx::{GfxError, GfxResult};

/// frames in flight 的计数
///
/// `current_frame` 决定本帧使用哪一组 command buffer / fence / semaphore / uniform buffer
pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
    current_frame: usize,
    frames_in_flight: usize,
}
// new & init
impl FrameCounter {
    pub fn new(frames_in_flight: usize) -> Self {
        debug_assert!(frames_in_flight > 0);
        Self {
            frame_id: 0,
            current_frame: 0,
            frames_in_flight,
        }
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
        self.current_frame = (self.current_frame + 1) % self.frames_in_flight;
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}-{}]", self.frame_id, self.current_frame)
    }
}

/// 一帧的状态
///
/// `Idle -> Acquiring -> Recording -> Submitted -> Presenting -> Idle`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}
impl FrameState {
    pub fn name(self) -> &'static str {
        match self {
            FrameState::Idle => "Idle",
            FrameState::Acquiring => "Acquiring",
            FrameState::Recording => "Recording",
            FrameState::Submitted => "Submitted",
            FrameState::Presenting => "Presenting",
        }
    }

    /// 合法的下一个状态
    ///
    /// `Acquiring -> Idle` 对应 swapchain out of date，本帧被跳过
    fn can_transit_to(self, next: FrameState) -> bool {
        matches!(
            (self, next),
            (FrameState::Idle, FrameState::Acquiring)
                | (FrameState::Acquiring, FrameState::Recording)
                | (FrameState::Acquiring, FrameState::Idle)
                | (FrameState::Recording, FrameState::Submitted)
                | (FrameState::Submitted, FrameState::Presenting)
                | (FrameState::Presenting, FrameState::Idle)
        )
    }

    /// 状态迁移，非法迁移返回 `InvalidFrameState`，状态不变
    pub fn transit(&mut self, op: &'static str, next: FrameState) -> GfxResult<()> {
        if !self.can_transit_to(next) {
            return Err(GfxError::InvalidFrameState { op, state: self.name() });
        }
        *self = next;
        Ok(())
    }

    /// 录制命令只能发生在 `Recording` 状态
    pub fn expect(self, op: &'static str, expected: FrameState) -> GfxResult<()> {
        if self != expected {
            return Err(GfxError::InvalidFrameState { op, state: self.name() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rotation() {
        let mut counter = FrameCounter::new(2);
        let frames = (0..6)
            .map(|_| {
                let f = counter.current_frame();
                counter.next_frame();
                f
            })
            .collect::<Vec<_>>();
        assert_eq!(frames, vec![0, 1, 0, 1, 0, 1]);
        assert_eq!(counter.frame_id(), 6);
    }

    #[test]
    fn test_frame_rotation_bounded() {
        for fif in 1..=3 {
            let mut counter = FrameCounter::new(fif);
            for n in 0..20 {
                assert_eq!(counter.current_frame(), n % fif);
                assert!(counter.current_frame() < fif);
                counter.next_frame();
            }
        }
    }

    #[test]
    fn test_full_cycle() {
        let mut state = FrameState::default();
        for next in [
            FrameState::Acquiring,
            FrameState::Recording,
            FrameState::Submitted,
            FrameState::Presenting,
            FrameState::Idle,
        ] {
            state.transit("test", next).unwrap();
        }
        assert_eq!(state, FrameState::Idle);
    }

    #[test]
    fn test_out_of_date_skips_frame() {
        let mut state = FrameState::Idle;
        state.transit("begin_frame", FrameState::Acquiring).unwrap();
        state.transit("begin_frame", FrameState::Idle).unwrap();
        assert_eq!(state, FrameState::Idle);
    }

    #[test]
    fn test_invalid_transition() {
        let mut state = FrameState::Idle;
        let err = state.transit("end_frame", FrameState::Submitted).unwrap_err();
        assert!(matches!(
            err,
            GfxError::InvalidFrameState {
                op: "end_frame",
                state: "Idle"
            }
        ));
        assert_eq!(state, FrameState::Idle);

        assert!(state.expect("draw_indexed", FrameState::Recording).is_err());
        state.transit("begin_frame", FrameState::Acquiring).unwrap();
        state.transit("begin_frame", FrameState::Recording).unwrap();
        assert!(state.expect("draw_indexed", FrameState::Recording).is_ok());
    }
}
