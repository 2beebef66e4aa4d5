// THEORY:
// A `Block` is the unit of temporal memory in the left-things engine. The frame
// is tiled into blocks, and each block remembers exactly one thing: how long it
// has been continuously covered by foreground.
//
// Key architectural principles:
// 1.  **Tiny state**: three fields. Whether the block is covered in the current
//     frame, when the current run of coverage began, and whether that run has
//     already outlasted the supervision duration.
// 2.  **Strict contiguity**: Under `DwellPolicy::Strict` a single uncovered frame
//     wipes the block back to its default state. Dwell time is never carried
//     across a gap.
// 3.  **Disposable**: Blocks carry no identity. When the grid geometry changes the
//     whole array is thrown away and rebuilt from `Block::default()`.

pub mod block {
    use chrono::{DateTime, Duration, Utc};

    /// How a block treats a frame in which it is not covered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum DwellPolicy {
        /// Any uncovered frame resets the block completely.
        #[default]
        Strict,
    }

    /// Temporal occupancy state of one grid cell.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Block {
        /// The block is covered by foreground in the current frame.
        pub is_occupied: bool,
        /// Capture time of the first frame of the current coverage run.
        pub appear_timestamp: Option<DateTime<Utc>>,
        /// The current run has lasted longer than the supervision duration.
        pub is_standing: bool,
    }

    impl Block {
        /// Folds the occupancy observed at `timestamp` into the block's history.
        pub fn observe(
            &mut self,
            occupied: bool,
            timestamp: DateTime<Utc>,
            supervision: Duration,
            policy: DwellPolicy,
        ) {
            if !occupied {
                match policy {
                    DwellPolicy::Strict => *self = Block::default(),
                }
                return;
            }

            self.is_occupied = true;
            match self.appear_timestamp {
                None => self.appear_timestamp = Some(timestamp),
                Some(appeared) => {
                    if timestamp > appeared + supervision {
                        self.is_standing = true;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::block::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_first_occupied_frame_records_appearance() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut block = Block::default();

        block.observe(true, t0, Duration::seconds(10), DwellPolicy::Strict);

        assert!(block.is_occupied);
        assert_eq!(block.appear_timestamp, Some(t0));
        assert!(!block.is_standing);
    }

    #[test]
    fn test_exactly_supervision_duration_is_not_enough() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let supervision = Duration::seconds(10);
        let mut block = Block::default();

        block.observe(true, t0, supervision, DwellPolicy::Strict);
        block.observe(true, t0 + supervision, supervision, DwellPolicy::Strict);
        assert!(!block.is_standing);

        block.observe(true, t0 + supervision + Duration::milliseconds(1), supervision, DwellPolicy::Strict);
        assert!(block.is_standing);
    }

    #[test]
    fn test_empty_frame_resets_everything() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let supervision = Duration::seconds(1);
        let mut block = Block::default();

        block.observe(true, t0, supervision, DwellPolicy::Strict);
        block.observe(true, t0 + Duration::seconds(2), supervision, DwellPolicy::Strict);
        assert!(block.is_standing);

        block.observe(false, t0 + Duration::seconds(3), supervision, DwellPolicy::Strict);
        assert_eq!(block, Block::default());
    }
}
