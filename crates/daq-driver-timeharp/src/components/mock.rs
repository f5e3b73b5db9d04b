//! Simulated TimeHarp 200.
//!
//! Enforces the call order the card needs (initialize before anything else, a
//! measurement mode before start, stop before reading) and the hardware
//! setting limits. A started measurement accumulates a seeded fluorescence
//! decay so histograms are reproducible.

use crate::components::sdk::{
    HistogramMode, MeasurementMode, ThError, TimeHarpSdk, ACQTMAX, ACQTMIN, BLOCKSIZE, DISCRMAX,
    DISCRMIN, FLAG_OVERFLOW, OFFSETMAX, OFFSETMIN, RANGES, SYNCMAX, SYNCMIN, ZCMAX, ZCMIN,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::time::Instant;

const ERR_FORCED: i32 = -100;
const ERR_NOT_INITIALIZED: i32 = -101;
const ERR_OUT_OF_RANGE: i32 = -102;
const ERR_NO_MODE: i32 = -103;
const ERR_RUNNING: i32 = -104;
const ERR_BUFFER_TOO_SMALL: i32 = -105;

/// Finest bin width in nanoseconds (range 0).
const BASE_RESOLUTION_NS: f32 = 0.037;
/// Counts a bin can hold before the card flags overflow.
const OVERFLOW_COUNT: u32 = 65_535;

/// One simulated `thlib` entry point, for call recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThCall {
    /// `TH_Initialize`
    Initialize,
    /// `TH_Calibrate`
    Calibrate,
    /// `TH_SetCFDDiscrMin`
    SetCfdDiscrMin,
    /// `TH_SetCFDZeroCross`
    SetCfdZeroCross,
    /// `TH_SetSyncLevel`
    SetSyncLevel,
    /// `TH_SetRange`
    SetRange,
    /// `TH_SetOffset`
    SetOffset,
    /// `TH_SetStopOverflow`
    SetStopOverflow,
    /// `TH_SetMMode`
    SetMMode,
    /// `TH_ClearHistMem`
    ClearHistMem,
    /// `TH_StartMeas`
    StartMeas,
    /// `TH_StopMeas`
    StopMeas,
    /// `TH_CTCStatus`
    CtcStatus,
    /// `TH_GetBlock`
    GetBlock,
    /// `TH_GetFlags`
    Flags,
    /// `TH_GetCountRate`
    CountRate,
}

/// Shape of the simulated signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedSignal {
    /// Photon counts per second reaching the card.
    pub count_rate: i32,
    /// Decay constant in nanoseconds.
    pub lifetime_ns: f32,
    /// Rising edge position in nanoseconds after the offset.
    pub delay_ns: f32,
}

impl Default for SimulatedSignal {
    fn default() -> Self {
        Self {
            count_rate: 200_000,
            lifetime_ns: 3.5,
            delay_ns: 10.0,
        }
    }
}

/// In-memory stand-in for a TimeHarp 200 card.
#[derive(Debug)]
pub struct SimulatedTimeHarp {
    rng: ChaCha8Rng,
    signal: SimulatedSignal,
    mode: Option<MeasurementMode>,
    calibrated: bool,
    range: i32,
    offset_ns: i32,
    stop_overflow: bool,
    mmode: Option<(HistogramMode, i32)>,
    started: Option<Instant>,
    histogram: Vec<u32>,
    overflow: bool,
    failing: HashSet<ThCall>,
    calls: Vec<ThCall>,
}

impl Default for SimulatedTimeHarp {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SimulatedTimeHarp {
    /// A card whose histograms are reproducible for a given `seed`.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            rng,
            signal: SimulatedSignal::default(),
            mode: None,
            calibrated: false,
            range: 0,
            offset_ns: 0,
            stop_overflow: false,
            mmode: None,
            started: None,
            histogram: vec![0; BLOCKSIZE],
            overflow: false,
            failing: HashSet::new(),
            calls: Vec::new(),
        }
    }

    /// Replace the simulated signal.
    pub fn with_signal(mut self, signal: SimulatedSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Make every later call of `call` fail.
    pub fn fail(&mut self, call: ThCall) {
        self.failing.insert(call);
    }

    /// Undo an earlier [`fail`](Self::fail).
    pub fn recover(&mut self, call: ThCall) {
        self.failing.remove(&call);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> &[ThCall] {
        &self.calls
    }

    /// How many times `call` was made.
    pub fn count(&self, call: ThCall) -> usize {
        self.calls.iter().filter(|&&c| c == call).count()
    }

    /// Whether calibration has run since initialization.
    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Whether a measurement has been started and not stopped.
    pub fn is_measuring(&self) -> bool {
        self.started.is_some()
    }

    /// Last value passed to `set_stop_overflow`.
    pub fn stops_on_overflow(&self) -> bool {
        self.stop_overflow
    }

    /// Last mode and acquisition time passed to `set_mmode`.
    pub fn histogram_mode(&self) -> Option<(HistogramMode, i32)> {
        self.mmode
    }

    fn enter(&mut self, call: ThCall) -> Result<(), ThError> {
        self.calls.push(call);
        if self.failing.contains(&call) {
            return Err(ThError::new(ERR_FORCED, format!("simulated {:?} failure", call)));
        }
        Ok(())
    }

    fn require_standard(&self) -> Result<(), ThError> {
        match self.mode {
            Some(MeasurementMode::Standard) => Ok(()),
            Some(MeasurementMode::Tttr) => Err(ThError::new(
                ERR_NOT_INITIALIZED,
                "Card initialized in TTTR mode",
            )),
            None => Err(ThError::new(ERR_NOT_INITIALIZED, "Card not initialized")),
        }
    }

    fn require_idle(&self) -> Result<(), ThError> {
        if self.started.is_some() {
            Err(ThError::new(ERR_RUNNING, "Measurement running"))
        } else {
            Ok(())
        }
    }

    fn in_range(value: i32, min: i32, max: i32, what: &str) -> Result<(), ThError> {
        if (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(ThError::new(
                ERR_OUT_OF_RANGE,
                format!("{} {} outside {}..={}", what, value, min, max),
            ))
        }
    }

    fn bin_width_ns(&self) -> f32 {
        BASE_RESOLUTION_NS * (1u32 << self.range.clamp(0, RANGES - 1)) as f32
    }

    /// Add the photons of `elapsed_ms` into the histogram.
    fn accumulate(&mut self, elapsed_ms: i32) {
        let photons = i64::from(self.signal.count_rate) * i64::from(elapsed_ms.max(0)) / 1000;
        let width = self.bin_width_ns();
        let lifetime = self.signal.lifetime_ns.max(f32::EPSILON);
        let delay = self.signal.delay_ns - self.offset_ns as f32;

        for _ in 0..photons {
            let u: f32 = self.rng.gen_range(f32::EPSILON..1.0);
            let jitter: f32 = self.rng.gen_range(-0.05..0.05);
            let t = delay + jitter - lifetime * u.ln();
            if t < 0.0 {
                continue;
            }
            let bin = (t / width) as usize;
            if let Some(count) = self.histogram.get_mut(bin) {
                if *count >= OVERFLOW_COUNT {
                    self.overflow = true;
                    if self.stop_overflow {
                        return;
                    }
                } else {
                    *count += 1;
                }
            }
        }
    }
}

impl TimeHarpSdk for SimulatedTimeHarp {
    fn initialize(&mut self, mode: MeasurementMode) -> Result<(), ThError> {
        self.enter(ThCall::Initialize)?;
        self.mode = Some(mode);
        self.calibrated = false;
        self.mmode = None;
        self.started = None;
        Ok(())
    }

    fn calibrate(&mut self) -> Result<(), ThError> {
        self.enter(ThCall::Calibrate)?;
        self.require_standard()?;
        self.calibrated = true;
        Ok(())
    }

    fn set_cfd_discr_min(&mut self, millivolts: i32) -> Result<(), ThError> {
        self.enter(ThCall::SetCfdDiscrMin)?;
        self.require_standard()?;
        Self::in_range(millivolts, DISCRMIN, DISCRMAX, "CFD discriminator")
    }

    fn set_cfd_zero_cross(&mut self, millivolts: i32) -> Result<(), ThError> {
        self.enter(ThCall::SetCfdZeroCross)?;
        self.require_standard()?;
        Self::in_range(millivolts, ZCMIN, ZCMAX, "CFD zero cross")
    }

    fn set_sync_level(&mut self, millivolts: i32) -> Result<(), ThError> {
        self.enter(ThCall::SetSyncLevel)?;
        self.require_standard()?;
        Self::in_range(millivolts, SYNCMIN, SYNCMAX, "Sync level")
    }

    fn set_range(&mut self, range: i32) -> Result<(), ThError> {
        self.enter(ThCall::SetRange)?;
        self.require_standard()?;
        Self::in_range(range, 0, RANGES - 1, "Range")?;
        self.range = range;
        Ok(())
    }

    fn set_offset(&mut self, nanoseconds: i32) -> Result<i32, ThError> {
        self.enter(ThCall::SetOffset)?;
        self.require_standard()?;
        // The card moves the offset in 2 ns steps.
        let applied = nanoseconds.clamp(OFFSETMIN, OFFSETMAX) / 2 * 2;
        self.offset_ns = applied;
        Ok(applied)
    }

    fn set_stop_overflow(&mut self, stop: bool) -> Result<(), ThError> {
        self.enter(ThCall::SetStopOverflow)?;
        self.require_standard()?;
        self.stop_overflow = stop;
        Ok(())
    }

    fn set_mmode(&mut self, mode: HistogramMode, acquisition_ms: i32) -> Result<(), ThError> {
        self.enter(ThCall::SetMMode)?;
        self.require_standard()?;
        Self::in_range(acquisition_ms, ACQTMIN, ACQTMAX, "Acquisition time")?;
        self.mmode = Some((mode, acquisition_ms));
        Ok(())
    }

    fn clear_hist_mem(&mut self, block: i32) -> Result<(), ThError> {
        self.enter(ThCall::ClearHistMem)?;
        self.require_standard()?;
        self.require_idle()?;
        Self::in_range(block, 0, 0, "Block")?;
        self.histogram.iter_mut().for_each(|c| *c = 0);
        self.overflow = false;
        Ok(())
    }

    fn start_meas(&mut self) -> Result<(), ThError> {
        self.enter(ThCall::StartMeas)?;
        self.require_standard()?;
        self.require_idle()?;
        if self.mmode.is_none() {
            return Err(ThError::new(ERR_NO_MODE, "Measurement mode not set"));
        }
        self.started = Some(Instant::now());
        Ok(())
    }

    fn stop_meas(&mut self) -> Result<(), ThError> {
        self.enter(ThCall::StopMeas)?;
        self.require_standard()?;
        if let Some(started) = self.started.take() {
            let elapsed = started.elapsed().as_millis().min(i32::MAX as u128) as i32;
            let elapsed = match self.mmode {
                Some((HistogramMode::OneShot, tacq)) => tacq,
                _ => elapsed,
            };
            self.accumulate(elapsed);
        }
        Ok(())
    }

    fn ctc_status(&mut self) -> Result<bool, ThError> {
        self.enter(ThCall::CtcStatus)?;
        self.require_standard()?;
        Ok(match (self.started, self.mmode) {
            (Some(started), Some((HistogramMode::OneShot, tacq))) => {
                started.elapsed().as_millis() >= tacq.max(0) as u128
            }
            (Some(_), _) => false,
            (None, _) => true,
        })
    }

    fn resolution(&mut self) -> f32 {
        self.bin_width_ns()
    }

    fn get_block(&mut self, counts: &mut [u32], block: i32) -> Result<(), ThError> {
        self.enter(ThCall::GetBlock)?;
        self.require_standard()?;
        self.require_idle()?;
        Self::in_range(block, 0, 0, "Block")?;
        if counts.len() < BLOCKSIZE {
            return Err(ThError::new(
                ERR_BUFFER_TOO_SMALL,
                format!("Buffer holds {} bins, need {}", counts.len(), BLOCKSIZE),
            ));
        }
        counts[..BLOCKSIZE].copy_from_slice(&self.histogram);
        Ok(())
    }

    fn flags(&mut self) -> Result<i32, ThError> {
        self.enter(ThCall::Flags)?;
        Ok(if self.overflow { FLAG_OVERFLOW } else { 0 })
    }

    fn count_rate(&mut self) -> Result<i32, ThError> {
        self.enter(ThCall::CountRate)?;
        self.require_standard()?;
        Ok(self.signal.count_rate)
    }
}
