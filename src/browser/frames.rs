//! Which network failures mean the page itself did not load.
//!
//! `Network.loadingFailed` carries no frame id, and iframe documents are
//! `Document` resources too. Requests are tied to their frame when they are
//! sent, and only failures of the main frame's own documents count.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub(crate) struct MainFrameRequests {
    main_frame: Option<String>,
    pending: HashSet<String>,
}

impl MainFrameRequests {
    pub fn new(main_frame: Option<String>) -> Self {
        Self {
            main_frame,
            pending: HashSet::new(),
        }
    }

    /// Note a request as it is sent. Without a known main frame, the first
    /// document request's frame is taken as the main one.
    pub fn observe_request(&mut self, frame_id: Option<&str>, is_document: bool, request_id: &str) {
        if !is_document {
            return;
        }
        let Some(frame_id) = frame_id else {
            return;
        };
        let main = self.main_frame.get_or_insert_with(|| frame_id.to_string());
        if main.as_str() == frame_id {
            self.pending.insert(request_id.to_string());
        }
    }

    /// Note a finished request so its id is not kept around.
    pub fn observe_finished(&mut self, request_id: &str) {
        self.pending.remove(request_id);
    }

    /// Whether a failed request was a main-frame document load.
    /// Canceled loads are navigations replaced by another one.
    pub fn is_main_frame_failure(&mut self, request_id: &str, is_document: bool, canceled: bool) -> bool {
        let tracked = self.pending.remove(request_id);
        tracked && is_document && !canceled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subframe_failure_is_ignored() {
        let mut requests = MainFrameRequests::new(Some("main".to_string()));
        requests.observe_request(Some("main"), true, "r1");
        requests.observe_request(Some("ad-frame"), true, "r2");

        assert!(!requests.is_main_frame_failure("r2", true, false));
        assert!(requests.is_main_frame_failure("r1", true, false));
    }

    #[test]
    fn test_canceled_and_finished_loads_are_ignored() {
        let mut requests = MainFrameRequests::new(Some("main".to_string()));
        requests.observe_request(Some("main"), true, "r1");
        requests.observe_request(Some("main"), true, "r2");
        requests.observe_finished("r2");

        assert!(!requests.is_main_frame_failure("r1", true, true));
        assert!(!requests.is_main_frame_failure("r2", true, false));
    }

    #[test]
    fn test_main_frame_learned_from_first_document() {
        let mut requests = MainFrameRequests::new(None);
        requests.observe_request(Some("f1"), false, "script");
        requests.observe_request(Some("f1"), true, "doc");
        requests.observe_request(Some("f2"), true, "iframe");

        assert!(!requests.is_main_frame_failure("script", false, false));
        assert!(!requests.is_main_frame_failure("iframe", true, false));
        assert!(requests.is_main_frame_failure("doc", true, false));
    }
}
