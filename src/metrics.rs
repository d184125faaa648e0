use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageCaptureMetrics {
    pub index: usize,
    pub start_y: f32,
    pub height: f32,
    pub encode_ms: f64,
    pub bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaptureMetrics {
    pub pages: Vec<PageCaptureMetrics>,
    pub total_encode_ms: f64,
    pub total_bytes: usize,
}

impl CaptureMetrics {
    pub fn record(&mut self, page: PageCaptureMetrics) {
        self.total_encode_ms += page.encode_ms;
        self.total_bytes += page.bytes;
        self.pages.push(page);
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
