//! 关键帧时间索引与关键帧数据

use std::sync::Arc;

use crate::{EngineError, Result};

/// 关键帧查找结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KeyframeLookup {
    /// 时间落在范围外或只有一帧：直接取该帧
    Single(usize),
    Between {
        start_frame: usize,
        end_frame: usize,
        /// 0 ~ 1
        delta: f32,
        /// 两帧间隔（秒）
        duration: f32,
    },
}

/// 关键帧时间表（非空、有限、不递减）
#[derive(Clone, Debug)]
pub struct KeyframeIndexer {
    times: Arc<[f32]>,
}

impl KeyframeIndexer {
    pub fn new(times: Vec<f32>) -> Result<Self> {
        if times.is_empty() {
            return Err(EngineError::InvalidKeyframeData("channel has no keyframes".into()));
        }
        if let Some(bad) = times.iter().find(|t| !t.is_finite()) {
            return Err(EngineError::InvalidKeyframeData(format!("keyframe time {} is not finite", bad)));
        }
        if times.windows(2).any(|w| w[1] < w[0]) {
            return Err(EngineError::InvalidKeyframeData("keyframe times are not sorted".into()));
        }
        Ok(Self { times: times.into() })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f32] {
        &self.times
    }

    pub fn last_time(&self) -> f32 {
        self.times[self.times.len() - 1]
    }

    pub fn find(&self, time: f32) -> KeyframeLookup {
        let last = self.times.len() - 1;
        if last == 0 || time <= self.times[0] {
            return KeyframeLookup::Single(0);
        }
        if time >= self.times[last] {
            return KeyframeLookup::Single(last);
        }

        // times[start] <= time < times[start + 1]
        let start_frame = self.times.partition_point(|t| *t <= time) - 1;
        let end_frame = start_frame + 1;
        let duration = self.times[end_frame] - self.times[start_frame];
        if duration <= 0.0 {
            return KeyframeLookup::Single(end_frame);
        }
        KeyframeLookup::Between {
            start_frame,
            end_frame,
            delta: (time - self.times[start_frame]) / duration,
            duration,
        }
    }
}

/// 关键帧数据：每帧 `elements` 个值
#[derive(Clone, Debug)]
pub struct KeyframeValues<T> {
    values: Arc<[T]>,
    elements: usize,
}

impl<T> KeyframeValues<T> {
    pub fn new(values: Vec<T>, elements: usize) -> Result<Self> {
        if elements == 0 || values.len() % elements != 0 {
            return Err(EngineError::InvalidKeyframeData(format!(
                "{} values cannot be split into frames of {} elements",
                values.len(),
                elements
            )));
        }
        Ok(Self { values: values.into(), elements })
    }

    pub fn elements(&self) -> usize {
        self.elements
    }

    pub fn frames(&self) -> usize {
        self.values.len() / self.elements
    }

    /// 第 `frame` 帧的全部元素（越界时取最后一帧）
    pub fn frame(&self, frame: usize) -> &[T] {
        let frame = frame.min(self.frames().saturating_sub(1));
        &self.values[frame * self.elements..(frame + 1) * self.elements]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_between_frames() {
        let indexer = KeyframeIndexer::new(vec![0.0, 1.0, 3.0]).unwrap();
        match indexer.find(2.0) {
            KeyframeLookup::Between { start_frame, end_frame, delta, duration } => {
                assert_eq!((start_frame, end_frame), (1, 2));
                assert!((delta - 0.5).abs() < 1e-6);
                assert_eq!(duration, 2.0);
            }
            other => panic!("unexpected lookup {:?}", other),
        }
    }

    #[test]
    fn test_find_out_of_range_clamps() {
        let indexer = KeyframeIndexer::new(vec![0.5, 1.0]).unwrap();
        assert_eq!(indexer.find(0.0), KeyframeLookup::Single(0));
        assert_eq!(indexer.find(5.0), KeyframeLookup::Single(1));

        let single = KeyframeIndexer::new(vec![2.0]).unwrap();
        assert_eq!(single.find(10.0), KeyframeLookup::Single(0));
    }

    #[test]
    fn test_invalid_times() {
        assert!(KeyframeIndexer::new(vec![]).is_err());
        assert!(KeyframeIndexer::new(vec![1.0, 0.0]).is_err());
        assert!(KeyframeIndexer::new(vec![0.0, f32::NAN]).is_err());
    }

    #[test]
    fn test_values_layout() {
        let values = KeyframeValues::new(vec![1, 2, 3, 4, 5, 6], 3).unwrap();
        assert_eq!(values.frames(), 2);
        assert_eq!(values.frame(1), &[4, 5, 6]);
        assert!(KeyframeValues::new(vec![1, 2], 3).is_err());
    }
}
