use std::collections::VecDeque;

use oddity_rtc_protocol::Candidate;

/// Remote candidates that arrived before the remote description was applied.
///
/// The queue starts out buffering. Draining it hands back everything that was
/// buffered, in receipt order, and switches to pass-through for good.
#[derive(Debug)]
pub enum CandidateQueue {
    Buffering(VecDeque<Candidate>),
    PassThrough,
}

impl CandidateQueue {
    pub fn new() -> Self {
        CandidateQueue::Buffering(VecDeque::new())
    }

    /// Buffers the candidate, or hands it straight back if the queue has
    /// already been drained and the caller may apply it immediately.
    pub fn admit(&mut self, candidate: Candidate) -> Option<Candidate> {
        match self {
            CandidateQueue::Buffering(queued) => {
                queued.push_back(candidate);
                None
            }
            CandidateQueue::PassThrough => Some(candidate),
        }
    }

    pub fn drain(&mut self) -> Vec<Candidate> {
        match std::mem::replace(self, CandidateQueue::PassThrough) {
            CandidateQueue::Buffering(queued) => queued.into(),
            CandidateQueue::PassThrough => Vec::new(),
        }
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self, CandidateQueue::PassThrough)
    }

    pub fn len(&self) -> usize {
        match self {
            CandidateQueue::Buffering(queued) => queued.len(),
            CandidateQueue::PassThrough => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CandidateQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {

    use oddity_rtc_protocol::Candidate;

    use super::CandidateQueue;

    fn candidate(n: u32) -> Candidate {
        Candidate::new("0", 0, format!("candidate:{n} 1 udp 1 10.0.0.{n} 5000 typ host"))
    }

    #[test]
    fn buffers_until_drained() {
        let mut queue = CandidateQueue::new();
        assert!(queue.admit(candidate(1)).is_none());
        assert!(queue.admit(candidate(2)).is_none());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain(), vec![candidate(1), candidate(2)]);
        assert!(queue.is_pass_through());
    }

    #[test]
    fn pass_through_after_drain() {
        let mut queue = CandidateQueue::new();
        let _ = queue.drain();
        assert_eq!(queue.admit(candidate(3)), Some(candidate(3)));
        assert!(queue.is_empty());
    }

    #[test]
    fn second_drain_is_empty() {
        let mut queue = CandidateQueue::new();
        queue.admit(candidate(1));
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.drain().is_empty());
        assert!(queue.is_pass_through());
    }
}
