//! Simulated PVCAM driver.
//!
//! [`SimulatedPvcam`] implements [`PvcamSdk`] with the same state rules the
//! real driver enforces: a script must be set up before it can be started,
//! a second exposure sequence cannot be initialized on top of a live one, and
//! teardown fails when nothing was initialized. Every call is recorded so tests
//! can assert on call order, and any call can be forced to fail.
//!
//! What a script "does" comes from a [`SimulatedScript`]: either one fixed
//! program for every setup (`with_program`), or one derived from the script
//! text by [`SimulatedScript::from_icl`].

use crate::components::sdk::{
    PvcamSdk, ReadoutStatus, RoiDescriptor, ScriptErrorInfo, ScriptSetup, SdkError,
};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::ffi::CStr;

// Error codes returned by the simulator. Values are arbitrary but stable.
const ERR_FORCED: i16 = 100;
const ERR_NOT_INITIALIZED: i16 = 101;
const ERR_ALREADY_INITIALIZED: i16 = 102;
const ERR_INVALID_HANDLE: i16 = 103;
const ERR_NO_SCRIPT: i16 = 104;
const ERR_SCRIPT_SYNTAX: i16 = 105;
const ERR_BUFFER_TOO_SMALL: i16 = 106;
const ERR_NO_CAMERA: i16 = 107;
const ERR_NO_ERROR_INFO: i16 = 108;

/// One simulated SDK entry point, for call recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdkCall {
    /// `open_camera`
    OpenCamera,
    /// `close_camera`
    CloseCamera,
    /// `camera_names`
    CameraNames,
    /// `cam_check`
    CamCheck,
    /// `exp_init_seq`
    InitSeq,
    /// `exp_uninit_seq`
    UninitSeq,
    /// `exp_init_script`
    InitScript,
    /// `exp_uninit_script`
    UninitScript,
    /// `setup_script`
    SetupScript,
    /// `listerr_script`
    ListErr,
    /// `display_script`
    DisplayScript,
    /// `start_seq`
    StartSeq,
    /// `check_status`
    CheckStatus,
    /// `abort`
    Abort,
}

/// Behaviour of one simulated ICL script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedScript {
    /// Byte size reported by setup.
    pub stream_bytes: u32,
    /// Regions reported by display, one per `PIXEL_DISPLAY`.
    pub regions: Vec<RoiDescriptor>,
    /// When set, setup fails and this is what listerr reports.
    pub compile_error: Option<ScriptErrorInfo>,
    /// Statuses returned by successive polls after each start. The last
    /// entry repeats.
    pub statuses: Vec<ReadoutStatus>,
}

impl Default for SimulatedScript {
    fn default() -> Self {
        Self {
            stream_bytes: 0,
            regions: Vec::new(),
            compile_error: None,
            statuses: vec![
                ReadoutStatus::ExposureInProgress,
                ReadoutStatus::ReadoutInProgress,
                ReadoutStatus::Complete,
            ],
        }
    }
}

impl SimulatedScript {
    /// Derive a program from ICL text.
    ///
    /// Each `PIXEL_DISPLAY(..., x, y)` directive becomes one region of
    /// `x * y` pixels, packed back to back. The last two integer arguments
    /// are the region size. A directive with fewer than two arguments, a
    /// non-integer argument or a missing `)` is reported as a compile error
    /// at that position.
    pub fn from_icl(script: &str) -> Self {
        const DIRECTIVE: &str = "PIXEL_DISPLAY(";

        let mut regions = Vec::new();
        let mut offset = 0usize;
        let mut char_base = 0u32;

        for (line_index, line) in script.lines().enumerate() {
            let line_no = line_index as u32 + 1;
            let mut search_from = 0;

            while let Some(found) = line[search_from..].find(DIRECTIVE) {
                let args_start = search_from + found + DIRECTIVE.len();
                let Some(close) = line[args_start..].find(')') else {
                    return Self::syntax_error(line, line_no, line.len(), char_base);
                };
                let args = &line[args_start..args_start + close];

                let mut values = Vec::new();
                let mut arg_pos = args_start;
                for arg in args.split(',') {
                    let trimmed = arg.trim();
                    match trimmed.parse::<u16>() {
                        Ok(v) => values.push(v),
                        Err(_) => {
                            let lead = arg.len() - arg.trim_start().len();
                            return Self::syntax_error(line, line_no, arg_pos + lead, char_base);
                        }
                    }
                    arg_pos += arg.len() + 1;
                }
                if values.len() < 2 {
                    return Self::syntax_error(line, line_no, args_start + close, char_base);
                }

                let (x, y) = (values[values.len() - 2], values[values.len() - 1]);
                regions.push(RoiDescriptor { x, y, offset });
                offset += usize::from(x) * usize::from(y);
                search_from = args_start + close + 1;
            }
            char_base += line.chars().count() as u32 + 1;
        }

        Self {
            stream_bytes: (offset * std::mem::size_of::<u16>()) as u32,
            regions,
            ..Self::default()
        }
    }

    fn syntax_error(line: &str, line_no: u32, byte_pos: usize, char_base: u32) -> Self {
        let column = line[..byte_pos.min(line.len())].chars().count() as u32 + 1;
        let character = line[byte_pos.min(line.len())..].chars().next().unwrap_or(' ');
        Self {
            compile_error: Some(ScriptErrorInfo {
                character,
                char_index: char_base + column - 1,
                line: line_no,
                column,
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct ActiveRun {
    hcam: i16,
    statuses: VecDeque<ReadoutStatus>,
    bytes: u32,
}

/// In-memory stand-in for the PVCAM driver.
#[derive(Debug)]
pub struct SimulatedPvcam {
    cameras: Vec<String>,
    open: BTreeMap<i16, String>,
    next_handle: i16,
    seq_initialized: bool,
    script_initialized: bool,
    program: Option<SimulatedScript>,
    loaded: BTreeMap<i16, SimulatedScript>,
    last_error: Option<ScriptErrorInfo>,
    running: Option<ActiveRun>,
    frame_counter: u16,
    failing: HashSet<SdkCall>,
    calls: Vec<SdkCall>,
}

impl Default for SimulatedPvcam {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPvcam {
    /// Two cameras, `SimCam` and `PrimeBSI`, none open.
    pub fn new() -> Self {
        Self {
            cameras: vec!["SimCam".to_string(), "PrimeBSI".to_string()],
            open: BTreeMap::new(),
            next_handle: 0,
            seq_initialized: false,
            script_initialized: false,
            program: None,
            loaded: BTreeMap::new(),
            last_error: None,
            running: None,
            frame_counter: 0,
            failing: HashSet::new(),
            calls: Vec::new(),
        }
    }

    /// Use `program` for every script instead of deriving one from its text.
    pub fn with_program(mut self, program: SimulatedScript) -> Self {
        self.program = Some(program);
        self
    }

    /// Replace the program used by later setups.
    pub fn set_program(&mut self, program: SimulatedScript) {
        self.program = Some(program);
    }

    /// Register `hcam` as open without going through `open_camera`.
    pub fn with_open_handle(mut self, hcam: i16) -> Self {
        self.open.insert(hcam, format!("SimCam#{}", hcam));
        self.next_handle = self.next_handle.max(hcam.saturating_add(1));
        self
    }

    /// Make every later call of `call` fail.
    pub fn fail(&mut self, call: SdkCall) {
        self.failing.insert(call);
    }

    /// Undo an earlier [`fail`](Self::fail).
    pub fn recover(&mut self, call: SdkCall) {
        self.failing.remove(&call);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> &[SdkCall] {
        &self.calls
    }

    /// How many times `call` was made.
    pub fn count(&self, call: SdkCall) -> usize {
        self.calls.iter().filter(|&&c| c == call).count()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Whether a script is currently installed on `hcam`.
    pub fn has_script(&self, hcam: i16) -> bool {
        self.loaded.contains_key(&hcam)
    }

    /// Whether the exposure-sequence layer is up.
    pub fn is_sequence_initialized(&self) -> bool {
        self.seq_initialized
    }

    /// Whether the scripting layer is up.
    pub fn is_scripting_initialized(&self) -> bool {
        self.script_initialized
    }

    fn enter(&mut self, call: SdkCall) -> Result<(), SdkError> {
        self.calls.push(call);
        if self.failing.contains(&call) {
            return Err(SdkError::new(ERR_FORCED, format!("simulated {:?} failure", call)));
        }
        Ok(())
    }

    fn require_open(&self, hcam: i16) -> Result<(), SdkError> {
        if self.open.contains_key(&hcam) {
            Ok(())
        } else {
            Err(SdkError::new(ERR_INVALID_HANDLE, "Invalid camera handle"))
        }
    }
}

impl PvcamSdk for SimulatedPvcam {
    fn open_camera(&mut self, name: &str) -> Result<i16, SdkError> {
        self.enter(SdkCall::OpenCamera)?;
        let name = if self.cameras.iter().any(|c| c == name) {
            name.to_string()
        } else {
            self.cameras
                .first()
                .cloned()
                .ok_or_else(|| SdkError::new(ERR_NO_CAMERA, "No cameras detected"))?
        };
        if let Some((&hcam, _)) = self.open.iter().find(|(_, n)| **n == name) {
            return Ok(hcam);
        }
        let hcam = self.next_handle;
        self.next_handle += 1;
        self.open.insert(hcam, name);
        Ok(hcam)
    }

    fn close_camera(&mut self, hcam: i16) -> Result<(), SdkError> {
        self.enter(SdkCall::CloseCamera)?;
        self.require_open(hcam)?;
        self.open.remove(&hcam);
        self.loaded.remove(&hcam);
        Ok(())
    }

    fn camera_names(&mut self) -> Result<Vec<String>, SdkError> {
        self.enter(SdkCall::CameraNames)?;
        Ok(self.cameras.clone())
    }

    fn cam_check(&mut self, hcam: i16) -> bool {
        self.enter(SdkCall::CamCheck).is_ok() && self.open.contains_key(&hcam)
    }

    fn exp_init_seq(&mut self) -> Result<(), SdkError> {
        self.enter(SdkCall::InitSeq)?;
        if self.seq_initialized {
            return Err(SdkError::new(
                ERR_ALREADY_INITIALIZED,
                "Exposure sequence already initialized",
            ));
        }
        self.seq_initialized = true;
        Ok(())
    }

    fn exp_uninit_seq(&mut self) -> Result<(), SdkError> {
        self.enter(SdkCall::UninitSeq)?;
        if !self.seq_initialized {
            return Err(SdkError::new(
                ERR_NOT_INITIALIZED,
                "Exposure sequence not initialized",
            ));
        }
        self.seq_initialized = false;
        Ok(())
    }

    fn exp_init_script(&mut self) -> Result<(), SdkError> {
        self.enter(SdkCall::InitScript)?;
        if !self.seq_initialized {
            return Err(SdkError::new(
                ERR_NOT_INITIALIZED,
                "Exposure sequence not initialized",
            ));
        }
        if self.script_initialized {
            return Err(SdkError::new(
                ERR_ALREADY_INITIALIZED,
                "ICL scripting already initialized",
            ));
        }
        self.script_initialized = true;
        Ok(())
    }

    fn exp_uninit_script(&mut self) -> Result<(), SdkError> {
        self.enter(SdkCall::UninitScript)?;
        if !self.script_initialized {
            return Err(SdkError::new(
                ERR_NOT_INITIALIZED,
                "ICL scripting not initialized",
            ));
        }
        self.script_initialized = false;
        self.loaded.clear();
        self.running = None;
        Ok(())
    }

    fn setup_script(&mut self, hcam: i16, script: &CStr) -> Result<ScriptSetup, SdkError> {
        self.enter(SdkCall::SetupScript)?;
        self.require_open(hcam)?;
        if !self.script_initialized {
            return Err(SdkError::new(
                ERR_NOT_INITIALIZED,
                "ICL scripting not initialized",
            ));
        }

        let program = match &self.program {
            Some(p) => p.clone(),
            None => SimulatedScript::from_icl(&script.to_string_lossy()),
        };

        if let Some(info) = program.compile_error {
            self.last_error = Some(info);
            return Err(SdkError::new(ERR_SCRIPT_SYNTAX, "ICL script syntax error"));
        }

        self.last_error = None;
        let setup = ScriptSetup {
            stream_bytes: program.stream_bytes,
            num_rects: program.regions.len() as u32,
        };
        self.loaded.insert(hcam, program);
        Ok(setup)
    }

    fn listerr_script(&mut self, hcam: i16) -> Result<ScriptErrorInfo, SdkError> {
        self.enter(SdkCall::ListErr)?;
        self.require_open(hcam)?;
        self.last_error
            .ok_or_else(|| SdkError::new(ERR_NO_ERROR_INFO, "No script error recorded"))
    }

    fn display_script(
        &mut self,
        hcam: i16,
        _buffer: &mut [u16],
        num_rects: u32,
    ) -> Result<Vec<RoiDescriptor>, SdkError> {
        self.enter(SdkCall::DisplayScript)?;
        let program = self
            .loaded
            .get(&hcam)
            .ok_or_else(|| SdkError::new(ERR_NO_SCRIPT, "No script loaded"))?;
        Ok(program
            .regions
            .iter()
            .take(num_rects as usize)
            .copied()
            .collect())
    }

    fn start_seq(&mut self, hcam: i16, buffer: &mut [u16]) -> Result<(), SdkError> {
        self.enter(SdkCall::StartSeq)?;
        self.require_open(hcam)?;
        let program = self
            .loaded
            .get(&hcam)
            .ok_or_else(|| SdkError::new(ERR_NO_SCRIPT, "No script loaded"))?;

        let needed = program.stream_bytes as usize / std::mem::size_of::<u16>();
        if buffer.len() < needed {
            return Err(SdkError::new(
                ERR_BUFFER_TOO_SMALL,
                format!("Buffer holds {} pixels, script needs {}", buffer.len(), needed),
            ));
        }

        let statuses: VecDeque<_> = program.statuses.iter().copied().collect();
        let bytes = program.stream_bytes;

        self.frame_counter = self.frame_counter.wrapping_add(1);
        let frame = self.frame_counter;
        for (i, px) in buffer.iter_mut().take(needed).enumerate() {
            *px = ((i as u32 + u32::from(frame)) % 4096) as u16 + 100;
        }

        self.running = Some(ActiveRun {
            hcam,
            statuses,
            bytes,
        });
        Ok(())
    }

    fn check_status(&mut self, hcam: i16) -> Result<(ReadoutStatus, u32), SdkError> {
        self.enter(SdkCall::CheckStatus)?;
        self.require_open(hcam)?;
        let Some(run) = self.running.as_mut().filter(|r| r.hcam == hcam) else {
            return Ok((ReadoutStatus::NotActive, 0));
        };
        let status = if run.statuses.len() > 1 {
            run.statuses.pop_front().unwrap_or(ReadoutStatus::NotActive)
        } else {
            run.statuses.front().copied().unwrap_or(ReadoutStatus::NotActive)
        };
        let bytes = if status == ReadoutStatus::Complete {
            run.bytes
        } else {
            0
        };
        Ok((status, bytes))
    }

    fn abort(&mut self, hcam: i16) -> Result<(), SdkError> {
        self.enter(SdkCall::Abort)?;
        if self.running.as_ref().is_some_and(|r| r.hcam == hcam) {
            self.running = None;
        }
        Ok(())
    }
}
