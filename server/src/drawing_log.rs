//! Append-only drawing log: the canonical state of the canvas.
//!
//! The log is owned exclusively by the router task; `append_*` is the single
//! serialization point that assigns sequence numbers, so all clients observe
//! draw and clear operations in the same total order. Entries are never
//! mutated or deleted once appended, except that entries strictly before the
//! most recent clear are unreachable by any replay and may be compacted away
//! once the log exceeds its retention limit.

use log::debug;
use shared::{DrawOp, LogEntry, Point, Tool};
use std::collections::VecDeque;

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

pub struct DrawingLog {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
    last_clear: Option<u64>,
    max_entries: usize,
}

impl DrawingLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_seq: 1,
            last_clear: None,
            max_entries,
        }
    }

    /// Highest sequence number assigned so far (0 when nothing was appended).
    pub fn head(&self) -> u64 {
        self.next_seq - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn append_draw(
        &mut self,
        user_id: String,
        tool: Tool,
        color: String,
        from: Point,
        to: Point,
    ) -> u64 {
        let seq = self.next();
        self.entries.push_back(LogEntry::Draw(DrawOp {
            seq,
            user_id,
            tool,
            color,
            from,
            to,
        }));
        self.compact();
        seq
    }

    pub fn append_clear(&mut self) -> u64 {
        let seq = self.next();
        self.entries.push_back(LogEntry::Clear { seq });
        self.last_clear = Some(seq);
        self.compact();
        seq
    }

    /// Every entry after the watermark, in strictly increasing seq order.
    ///
    /// When a clear exists after the watermark, replay starts at the most
    /// recent clear instead: entries before it are superseded and would be
    /// wiped again anyway, so skipping them bounds catch-up cost. The read is
    /// idempotent, identical watermarks produce identical output.
    pub fn replay_since(&self, since: u64) -> Vec<LogEntry> {
        let floor = match self.last_clear {
            Some(clear) if clear > since => clear - 1,
            _ => since,
        };
        self.entries
            .iter()
            .filter(|entry| entry.seq() > floor)
            .cloned()
            .collect()
    }

    /// Drops entries made unreachable by the last clear once the retention
    /// limit is exceeded. Without a clear nothing can be dropped; unbounded
    /// growth in that case is a known limitation.
    fn compact(&mut self) {
        if self.entries.len() <= self.max_entries {
            return;
        }
        let Some(clear) = self.last_clear else {
            return;
        };
        let before = self.entries.len();
        while let Some(front) = self.entries.front() {
            if front.seq() < clear {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        if self.entries.len() < before {
            debug!(
                "Compacted {} superseded log entries (head {})",
                before - self.entries.len(),
                self.head()
            );
        }
    }
}

impl Default for DrawingLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append_pen(log: &mut DrawingLog, user: &str) -> u64 {
        log.append_draw(
            user.to_string(),
            Tool::Pen,
            "#000000".to_string(),
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
        )
    }

    #[test]
    fn test_seq_strictly_increasing_no_gaps() {
        let mut log = DrawingLog::default();
        for expected in 1..=20u64 {
            assert_eq!(append_pen(&mut log, "alice"), expected);
        }
        let replay = log.replay_since(0);
        assert_eq!(replay.len(), 20);
        for (i, entry) in replay.iter().enumerate() {
            assert_eq!(entry.seq(), i as u64 + 1);
        }
    }

    #[test]
    fn test_replay_is_idempotent() {
        let mut log = DrawingLog::default();
        append_pen(&mut log, "alice");
        append_pen(&mut log, "bob");
        assert_eq!(log.replay_since(1), log.replay_since(1));
        assert_eq!(log.replay_since(1).len(), 1);
        assert_eq!(log.replay_since(1)[0].seq(), 2);
    }

    #[test]
    fn test_replay_starts_at_last_clear() {
        let mut log = DrawingLog::default();
        for _ in 0..4 {
            append_pen(&mut log, "alice");
        }
        assert_eq!(log.append_clear(), 5);
        append_pen(&mut log, "bob");

        // A client at watermark 0 gets the clear plus everything after it,
        // not the four superseded strokes.
        let replay = log.replay_since(0);
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0], LogEntry::Clear { seq: 5 });
        assert_eq!(replay[1].seq(), 6);
        // Superseded entries still exist in the log
        assert_eq!(log.len(), 6);
    }

    #[test]
    fn test_replay_past_clear_is_plain_suffix() {
        let mut log = DrawingLog::default();
        append_pen(&mut log, "alice");
        log.append_clear();
        append_pen(&mut log, "alice");
        append_pen(&mut log, "alice");

        // Watermark already beyond the clear: no restart, just the suffix
        let replay = log.replay_since(3);
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].seq(), 4);
    }

    #[test]
    fn test_head_tracks_assignment() {
        let mut log = DrawingLog::default();
        assert_eq!(log.head(), 0);
        append_pen(&mut log, "alice");
        assert_eq!(log.head(), 1);
        log.append_clear();
        assert_eq!(log.head(), 2);
    }

    #[test]
    fn test_compaction_preserves_replay() {
        let mut log = DrawingLog::new(4);
        for _ in 0..4 {
            append_pen(&mut log, "alice");
        }
        let clear_seq = log.append_clear();
        append_pen(&mut log, "bob");

        // Retention exceeded: the four pre-clear strokes are gone
        assert_eq!(log.len(), 2);
        let replay = log.replay_since(0);
        assert_eq!(replay[0], LogEntry::Clear { seq: clear_seq });
        assert_eq!(replay[1].seq(), clear_seq + 1);
        // Seq numbering is unaffected by compaction
        assert_eq!(log.head(), 6);
    }

    #[test]
    fn test_no_compaction_without_clear() {
        let mut log = DrawingLog::new(4);
        for _ in 0..10 {
            append_pen(&mut log, "alice");
        }
        assert_eq!(log.len(), 10);
        assert_eq!(log.replay_since(0).len(), 10);
    }
}
