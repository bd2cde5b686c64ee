use crate::RenderError;
use image::ImageFormat;
use pdf_engine::{DocumentHandle, PageRasterizer, RenderRequest, RgbaImage};
use std::fmt;
use std::io::Cursor;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(15);

/// Identifies one page render request. Only the ticket from the latest request may
/// update the displayed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTicket {
    pub generation: u64,
    pub page_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Applied,
    /// A newer request superseded this one; the result was dropped.
    Stale,
}

/// A page bitmap encoded as PNG, ready for display.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub page_number: u32,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedPage")
            .field("page_number", &self.page_number)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("png_len", &self.png.len())
            .finish()
    }
}

/// Single-slot holder for the displayed page plus the generation guard.
#[derive(Debug, Default)]
pub struct RenderSlot {
    generation: u64,
    in_flight: Option<RenderTicket>,
    current: Option<RenderedPage>,
}

impl RenderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn in_flight(&self) -> Option<RenderTicket> {
        self.in_flight
    }

    pub fn current(&self) -> Option<&RenderedPage> {
        self.current.as_ref()
    }

    /// Starts a new render generation. Every earlier ticket becomes stale and the
    /// displayed page is dropped until the new one lands.
    pub fn begin(&mut self, page_number: u32) -> RenderTicket {
        self.generation += 1;
        let ticket = RenderTicket { generation: self.generation, page_number };
        self.in_flight = Some(ticket);
        self.current = None;
        ticket
    }

    pub fn is_current(&self, ticket: RenderTicket) -> bool {
        ticket.generation == self.generation
    }

    pub fn complete(
        &mut self,
        ticket: RenderTicket,
        result: Result<RenderedPage, RenderError>,
    ) -> Result<RenderOutcome, RenderError> {
        if !self.is_current(ticket) {
            tracing::debug!(
                page = ticket.page_number,
                generation = ticket.generation,
                latest = self.generation,
                "dropping stale render result"
            );
            return Ok(RenderOutcome::Stale);
        }

        self.in_flight = None;

        match result {
            Ok(page) => {
                self.current = Some(page);
                Ok(RenderOutcome::Applied)
            }
            Err(err) => {
                tracing::warn!(page = ticket.page_number, error = %err, "page render failed");
                Err(err)
            }
        }
    }

    /// Drops the displayed page and invalidates outstanding tickets.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.in_flight = None;
        self.current = None;
    }
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|err| RenderError::Encode(err.to_string()))?;
    Ok(png)
}

fn rasterize_page(
    rasterizer: &dyn PageRasterizer,
    document: &DocumentHandle,
    page_number: u32,
    scale: f32,
) -> Result<RenderedPage, RenderError> {
    let request = RenderRequest { page_index: page_number - 1, scale };
    let image = rasterizer.rasterize(document, request)?;
    let (width, height) = image.dimensions();

    Ok(RenderedPage { page_number, width, height, png: encode_png(&image)? })
}

/// Renders one page (1-based) on a worker thread, waiting at most `timeout`.
///
/// A timed-out worker is left to finish on its own; its result is discarded.
pub fn render_page_blocking(
    rasterizer: Arc<dyn PageRasterizer>,
    document: DocumentHandle,
    page_number: u32,
    scale: f32,
    timeout: Duration,
) -> Result<RenderedPage, RenderError> {
    let page_count = document.page_count();
    if page_number == 0 || page_number > page_count {
        return Err(RenderError::PageOutOfRange { page: page_number, page_count });
    }

    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name(format!("render-page-{page_number}"))
        .spawn(move || {
            let result = rasterize_page(rasterizer.as_ref(), &document, page_number, scale);
            let _ = sender.send(result);
        })
        .map_err(|err| RenderError::Backend(format!("failed to spawn render worker: {err}")))?;

    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(page = page_number, ?timeout, "page render timed out");
            Err(RenderError::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => {
            Err(RenderError::Backend("render worker exited without a result".to_owned()))
        }
    }
}
