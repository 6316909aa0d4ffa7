use crate::model::CrawlRequest;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Priority queue ordered by (priority, insertion sequence), lowest first
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

#[derive(Debug)]
struct Entry {
    priority: u32,
    seq: u64,
    request: CrawlRequest,
}

// BinaryHeap is a max-heap, so the comparison is reversed
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PendingQueue {
    pub(crate) fn push(&mut self, request: CrawlRequest) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            priority: request.priority,
            seq,
            request,
        });
    }

    pub(crate) fn pop(&mut self) -> Option<CrawlRequest> {
        self.heap.pop().map(|entry| entry.request)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn request(path: &str, priority: u32) -> CrawlRequest {
        let mut request = CrawlRequest::seed(Url::parse(&format!("https://example.com{}", path)).unwrap());
        request.priority = priority;
        request
    }

    #[test]
    fn test_lowest_priority_first() {
        let mut queue = PendingQueue::default();
        queue.push(request("/two", 2));
        queue.push(request("/zero", 0));
        queue.push(request("/one", 1));

        assert_eq!(queue.pop().unwrap().url.path(), "/zero");
        assert_eq!(queue.pop().unwrap().url.path(), "/one");
        assert_eq!(queue.pop().unwrap().url.path(), "/two");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_fifo_among_equal_priority() {
        let mut queue = PendingQueue::default();
        for i in 0..5 {
            queue.push(request(&format!("/{}", i), 1));
        }

        let order: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|r| r.url.path().to_string())
            .collect();
        assert_eq!(order, vec!["/0", "/1", "/2", "/3", "/4"]);
    }
}
