//! Request/response pairing.
//!
//! The tunnel protocol correlates frames by id, so a capture can be folded
//! into exchanges: each request matched with the response carrying the same
//! id, plus the latency between them. Frames that never found a partner are
//! reported as orphans rather than dropped, since they usually point at the
//! exact spot where a session went wrong.

use std::collections::HashMap;

use crate::dissect::{DissectedFrame, FrameContent};

/// One matched request/response pair.
#[derive(Debug)]
pub struct Exchange {
    pub request: DissectedFrame,
    /// None when the capture ended before the response arrived.
    pub response: Option<DissectedFrame>,
}

impl Exchange {
    /// Seconds between request and response, when both were captured.
    pub fn latency(&self) -> Option<f64> {
        self.response
            .as_ref()
            .map(|response| response.timestamp - self.request.timestamp)
    }
}

/// Result of pairing a whole capture.
#[derive(Debug, Default)]
pub struct PairReport {
    pub exchanges: Vec<Exchange>,
    /// Responses with no outstanding request, and frames too corrupt to
    /// carry an id.
    pub orphans: Vec<DissectedFrame>,
}

/// Fold a timestamp-ordered frame sequence into exchanges.
///
/// Ids are only eight bits wide and wrap quickly, so a request stays
/// pending until its id is answered or reused; a reused id flushes the
/// older request as an unanswered exchange.
pub fn pair(frames: Vec<DissectedFrame>) -> PairReport {
    let mut report = PairReport::default();
    let mut pending: HashMap<u8, usize> = HashMap::new();

    for frame in frames {
        let id = match frame.id() {
            Some(id) => id,
            None => {
                report.orphans.push(frame);
                continue;
            }
        };

        if frame.is_request() {
            let slot = report.exchanges.len();
            report.exchanges.push(Exchange {
                request: frame,
                response: None,
            });
            // A reused id displaces the older request, which stays in the
            // report unanswered.
            pending.insert(id, slot);
        } else if matches!(frame.content, FrameContent::Frame(_)) {
            match pending.remove(&id) {
                Some(slot) => report.exchanges[slot].response = Some(frame),
                None => report.orphans.push(frame),
            }
        } else {
            report.orphans.push(frame);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Direction, RawFrame};
    use crate::dissect::dissect_frame;
    use kitsune_hal::dispatch::{Class, Request, Response};
    use kitsune_hal::wire::Frame;

    fn dissected(frame: &Frame, direction: Direction, timestamp: f64) -> DissectedFrame {
        let mut buf = bytes::BytesMut::new();
        frame.encode(&mut buf);
        dissect_frame(&RawFrame {
            direction,
            timestamp,
            data: buf.to_vec(),
        })
    }

    fn request(id: u8, timestamp: f64) -> DissectedFrame {
        dissected(
            &Frame::request(id, Request::GpioGet { handle: 1 }),
            Direction::GuestToDaemon,
            timestamp,
        )
    }

    fn response(id: u8, timestamp: f64) -> DissectedFrame {
        let response = Response {
            status: 1,
            data: Vec::new(),
        };
        dissected(
            &Frame::response(id, Class::Gpio, 3, response),
            Direction::DaemonToGuest,
            timestamp,
        )
    }

    #[test]
    fn pairs_by_id_and_computes_latency() {
        let report = pair(vec![request(7, 1.0), response(7, 1.5)]);

        assert_eq!(report.exchanges.len(), 1);
        assert!(report.orphans.is_empty());
        let latency = report.exchanges[0].latency().unwrap();
        assert!((latency - 0.5).abs() < 1e-9);
    }

    #[test]
    fn interleaved_ids_pair_independently() {
        let report = pair(vec![
            request(1, 0.0),
            request(2, 0.1),
            response(2, 0.2),
            response(1, 0.3),
        ]);

        assert_eq!(report.exchanges.len(), 2);
        assert_eq!(report.exchanges[0].response.as_ref().unwrap().id(), Some(1));
        assert_eq!(report.exchanges[1].response.as_ref().unwrap().id(), Some(2));
    }

    #[test]
    fn unanswered_request_stays_open() {
        let report = pair(vec![request(3, 0.0)]);

        assert_eq!(report.exchanges.len(), 1);
        assert!(report.exchanges[0].response.is_none());
        assert_eq!(report.exchanges[0].latency(), None);
    }

    #[test]
    fn unsolicited_response_is_an_orphan() {
        let report = pair(vec![response(9, 0.0)]);

        assert!(report.exchanges.is_empty());
        assert_eq!(report.orphans.len(), 1);
    }

    #[test]
    fn reused_id_answers_the_newer_request() {
        let report = pair(vec![request(5, 0.0), request(5, 1.0), response(5, 1.1)]);

        assert_eq!(report.exchanges.len(), 2);
        assert!(report.exchanges[0].response.is_none());
        assert!(report.exchanges[1].response.is_some());
    }
}
