//! Fixtures shared by the scenario tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use imgstream_rs::decode::signature::is_jpeg;
use imgstream_rs::{
    Broadcaster, BytesProvider, CallerContext, ColorModel, CompletionStatus, ConsumerRef, DecodeEngine,
    DecodeFailure, DecodePool, DecodeUnit, EngineOutcome, Hints, ImageConsumer, ImageEvent, ImageSource,
    ImageStream, PixelBlock, Rect, SignatureTable, WorkerHandle,
};

/// Pool that only runs units when the test asks it to
#[derive(Default)]
pub struct ManualPool {
    queue: Mutex<VecDeque<Arc<dyn DecodeUnit>>>,
    refusing: AtomicBool,
}

impl ManualPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse every later schedule
    pub fn refuse(&self) {
        self.refusing.store(true, Ordering::SeqCst);
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run the oldest queued unit on the calling thread
    pub fn run_next(&self) -> bool {
        let unit = self.queue.lock().pop_front();
        match unit {
            Some(unit) => {
                unit.fetch(&WorkerHandle::detached(0));
                true
            }
            None => false,
        }
    }

    /// Run units until the queue stays empty; returns how many ran
    pub fn run_all(&self) -> usize {
        let mut runs = 0;
        while self.run_next() {
            runs += 1;
        }
        runs
    }
}

fn same(a: &Arc<dyn DecodeUnit>, b: &Arc<dyn DecodeUnit>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl DecodePool for ManualPool {
    fn schedule(&self, unit: Arc<dyn DecodeUnit>) -> bool {
        if self.refusing.load(Ordering::SeqCst) {
            return false;
        }
        let mut queue = self.queue.lock();
        if !queue.iter().any(|queued| same(queued, &unit)) {
            queue.push_back(unit);
        }
        true
    }

    fn deschedule(&self, unit: &Arc<dyn DecodeUnit>) -> bool {
        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.retain(|queued| !same(queued, unit));
        queue.len() != before
    }
}

pub type Hook = Arc<dyn Fn(&ImageEvent) + Send + Sync>;

/// Consumer that records events and can run a hook after each one
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<ImageEvent>>,
    contexts: Mutex<Vec<CallerContext>>,
    hook: Mutex<Option<Hook>>,
    caching: bool,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn caching() -> Arc<Self> {
        Arc::new(Self {
            caching: true,
            ..Self::default()
        })
    }

    pub fn handle(self: &Arc<Self>) -> ConsumerRef {
        self.clone()
    }

    /// Run `hook` after every recorded event
    pub fn set_hook(&self, hook: impl Fn(&ImageEvent) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Arc::new(hook));
    }

    pub fn clear_hook(&self) {
        *self.hook.lock() = None;
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(ImageEvent::kind).collect()
    }

    pub fn events(&self) -> Vec<ImageEvent> {
        self.events.lock().clone()
    }

    pub fn contexts(&self) -> Vec<CallerContext> {
        self.contexts.lock().clone()
    }

    pub fn terminal_count(&self) -> usize {
        self.events.lock().iter().filter(|e| e.is_terminal()).count()
    }

    pub fn completions(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, ImageEvent::Complete { .. }))
            .count()
    }

    pub fn failure(&self) -> Option<DecodeFailure> {
        self.events.lock().iter().find_map(|e| match e {
            ImageEvent::Complete {
                status: CompletionStatus::Error(failure),
                ..
            } => Some(failure.clone()),
            _ => None,
        })
    }
}

impl ImageConsumer for Recorder {
    fn on_event(&self, event: &ImageEvent, context: &CallerContext) {
        self.events.lock().push(event.clone());
        self.contexts.lock().push(*context);
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(event);
        }
    }

    fn is_caching(&self) -> bool {
        self.caching
    }
}

/// One scripted engine action
#[derive(Clone, Debug)]
pub enum Step {
    Dimensions(u32, u32),
    ColorModel,
    Hints,
    /// A 2x1 band starting at the given row
    Pixels(u32),
    Frame { is_final: bool },
    Fail(&'static str),
    /// Return without a final completion
    Stop,
}

/// Engine replaying a fixed script, for driving sources deterministically
#[derive(Clone)]
pub struct ScriptedEngine {
    steps: Vec<Step>,
    honor_abort: bool,
    outcomes: Arc<Mutex<Vec<EngineOutcome>>>,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            honor_abort: true,
            outcomes: Arc::default(),
        }
    }

    /// Keep going after an abort, as an engine deep in a parse would
    pub fn ignoring_abort(mut self) -> Self {
        self.honor_abort = false;
        self
    }

    /// Outcomes of every run so far
    pub fn outcomes(&self) -> Vec<EngineOutcome> {
        self.outcomes.lock().clone()
    }

    /// Standard 2x2 pass: headers, two bands, final completion
    pub fn full_pass() -> Self {
        Self::new(vec![
            Step::Dimensions(2, 2),
            Step::ColorModel,
            Step::Hints,
            Step::Pixels(0),
            Step::Pixels(1),
            Step::Frame { is_final: true },
        ])
    }

    fn play(&self, out: &mut Broadcaster<'_>) -> EngineOutcome {
        for step in &self.steps {
            if self.honor_abort && out.is_aborted() {
                return EngineOutcome::Aborted;
            }
            match step {
                Step::Dimensions(w, h) => {
                    out.announce_dimensions(*w, *h);
                }
                Step::ColorModel => {
                    out.announce_color_model(ColorModel::Rgba8);
                }
                Step::Hints => {
                    out.announce_hints(Hints::TOP_DOWN_LEFT_RIGHT | Hints::COMPLETE_SCANLINES);
                    out.header_done();
                }
                Step::Pixels(row) => {
                    let block = PixelBlock::new(
                        Rect::new(0, *row, 2, 1),
                        ColorModel::Rgba8,
                        Bytes::from(vec![0x80; 8]),
                    );
                    if let Err(e) = out.deliver_pixels(block) {
                        return EngineOutcome::Failed(e.to_string());
                    }
                }
                Step::Frame { is_final } => {
                    let status = if *is_final {
                        CompletionStatus::ImageDone
                    } else {
                        CompletionStatus::FrameDone
                    };
                    out.complete(status, *is_final);
                }
                Step::Fail(reason) => return EngineOutcome::Failed(reason.to_string()),
                Step::Stop => return EngineOutcome::Completed,
            }
        }
        if self.honor_abort && out.is_aborted() {
            return EngineOutcome::Aborted;
        }
        EngineOutcome::Completed
    }
}

impl DecodeEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn run(&mut self, _stream: &mut ImageStream, out: &mut Broadcaster<'_>) -> EngineOutcome {
        let outcome = self.play(out);
        self.outcomes.lock().push(outcome.clone());
        outcome
    }
}

/// Leading bytes the scripted signature matches
pub const SCRIPT_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'S', b'C', b'R', b'I', b'P', b'T'];

/// Source whose JPEG signature is served by `engine`
pub fn scripted_source(engine: &ScriptedEngine, pool: Arc<dyn DecodePool>) -> ImageSource {
    let engine = engine.clone();
    let table = SignatureTable::new().with_signature("jpeg", is_jpeg, move || Box::new(engine.clone()));
    ImageSource::builder("scripted.jpg", Arc::new(BytesProvider::new(SCRIPT_MAGIC)), pool)
        .signatures(table)
        .build()
}

/// 2x2 GIF filled with opaque red, `frames` copies of the same frame
pub fn red_square_gif(frames: usize) -> Vec<u8> {
    let mut data = vec![
        b'G', b'I', b'F', b'8', b'9', b'a', // signature
        0x02, 0x00, 0x02, 0x00, 0x80, 0x00, 0x00, // 2x2, global table of 2
        0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, // red, black
    ];
    for _ in 0..frames {
        data.extend_from_slice(&[
            0x2C, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x02, 0x00, 0x00, // descriptor
            0x02, 0x03, 0x04, 0x08, 0x14, 0x00, // LZW data: four pixels of index 0
        ]);
    }
    data.push(0x3B);
    data
}

/// 1x1 opaque green truecolor PNG
pub const GREEN_PIXEL_PNG: [u8; 69] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // signature
    0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00,
    0x90, 0x77, 0x53, 0xDE, // crc
    0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT
    0x78, 0xDA, 0x63, 0x60, 0xF8, 0xCF, 0x00, 0x00, 0x02, 0x02, 0x01, 0x00, // zlib stream
    0x45, 0xF4, 0x52, 0xD4, // crc
    0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND
    0xAE, 0x42, 0x60, 0x82,
];

/// JPEG whose data stops right after a 3x2 baseline frame header
pub fn truncated_jpeg() -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    data.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    data.extend_from_slice(b"JFIF\0");
    data.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x02, 0x00, 0x03, 0x03]);
    data.extend_from_slice(&[0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01]);
    data
}

pub const ARROW_XBM: &str = "#define arrow_width 10\n\
    #define arrow_height 2\n\
    #define arrow_x_hot 1\n\
    #define arrow_y_hot 0\n\
    static unsigned char arrow_bits[] = {\n   0x01, 0x02, 0xff, 0x03 };\n";
