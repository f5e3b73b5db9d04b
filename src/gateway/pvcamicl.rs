//! `pvcamicl`: acquire with an ICL script.
//!
//! ```text
//! [DATA, ROI] = pvcamicl(HCAM, SCRIPT)            load, run once, uninit
//! [DATA, ROI] = pvcamicl(HCAM, SCRIPT, 'load')    load only; DATA is zeroed storage
//! DATA        = pvcamicl(HCAM, DATA, 'run')       run the loaded script into DATA
//! STATUS      = pvcamicl(HCAM, [], 'uninit')      uninit; STATUS is 1 or 0
//! ```
//!
//! ROI is a struct array with fields `x`, `y` and `offset` (one element per
//! `PIXEL_DISPLAY` directive), or the string `"no image"`. When a driver step
//! fails, DATA is an empty uint16 matrix, ROI is `"error"` and the failure is
//! reported through [`HostReply::warnings`].

use crate::gateway::{integer_arg, reply};
use daq_core::error::DaqError;
use daq_core::host::{HostArray, HostData, HostReply, HostValue, StructArray};
use daq_core::limits::validate_script_size;
use daq_driver_pvcam::{
    acquire_once, check_handle, load_script, run_script, uninit_script, PollPolicy, PvcamSdk,
    ScriptError, ScriptRois,
};

const SYNTAX: &str = "type 'help pvcamicl' for syntax";

/// Third argument of `pvcamicl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IclOption {
    /// Load, run once and uninit.
    Full,
    /// Load and return the ROI description.
    Load,
    /// Run a loaded script into the caller's buffer.
    Run,
    /// Release a loaded script.
    Uninit,
}

impl IclOption {
    /// Parse the option string; matching is case-sensitive.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "full" => Some(IclOption::Full),
            "load" => Some(IclOption::Load),
            "run" => Some(IclOption::Run),
            "uninit" => Some(IclOption::Uninit),
            _ => None,
        }
    }

    /// The option as the host spells it.
    pub fn as_str(self) -> &'static str {
        match self {
            IclOption::Full => "full",
            IclOption::Load => "load",
            IclOption::Run => "run",
            IclOption::Uninit => "uninit",
        }
    }
}

/// Validated call.
#[derive(Debug)]
enum IclRequest {
    Full { script: String },
    Load { script: String },
    Run { rows: usize, cols: usize, buffer: Vec<u16> },
    Uninit,
}

/// Typed result before flattening into output slots.
#[derive(Debug)]
enum IclOutput {
    Acquired { buffer: Vec<u16>, rois: ScriptRois },
    Ran { rows: usize, cols: usize, buffer: Vec<u16> },
    Uninitialized,
}

/// Run `pvcamicl` with host arguments `args`, returning `nlhs` outputs.
pub fn pvcamicl<S: PvcamSdk + ?Sized>(
    sdk: &mut S,
    nlhs: usize,
    args: &[HostValue],
    policy: &PollPolicy,
) -> Result<HostReply, DaqError> {
    let (hcam, request) = parse(nlhs, args)?;
    let option = match &request {
        IclRequest::Full { .. } => IclOption::Full,
        IclRequest::Load { .. } => IclOption::Load,
        IclRequest::Run { .. } => IclOption::Run,
        IclRequest::Uninit => IclOption::Uninit,
    };

    let result = execute(sdk, hcam, request, policy);
    if let Err(e) = &result {
        tracing::warn!(hcam, option = option.as_str(), "pvcamicl failed: {}", e);
    }
    Ok(flatten(option, result, nlhs))
}

fn parse(nlhs: usize, args: &[HostValue]) -> Result<(i16, IclRequest), DaqError> {
    if !(2..=3).contains(&args.len()) {
        return Err(DaqError::usage(SYNTAX));
    }

    let hcam: i16 = integer_arg(&args[0], "HCAM")?;

    let option = match args.get(2) {
        None => IclOption::Full,
        Some(value) => {
            let text = value
                .as_str()
                .ok_or_else(|| DaqError::usage("OPTION must be a character string"))?;
            if text.is_empty() {
                return Err(DaqError::usage("OPTION cannot be empty"));
            }
            IclOption::parse(text).ok_or_else(|| DaqError::usage("Invalid OPTION string"))?
        }
    };

    let request = match option {
        IclOption::Full | IclOption::Load => {
            let script = args[1]
                .as_str()
                .ok_or_else(|| DaqError::usage("SCRIPT must be a character string"))?;
            if script.is_empty() {
                return Err(DaqError::usage("SCRIPT cannot be empty"));
            }
            if nlhs > 2 {
                return Err(DaqError::usage("DATA and ROI are only outputs"));
            }
            validate_script_size(script)?;
            let script = script.to_string();
            if option == IclOption::Full {
                IclRequest::Full { script }
            } else {
                IclRequest::Load { script }
            }
        }
        IclOption::Run => {
            let array = args[1]
                .as_array()
                .ok_or_else(|| DaqError::usage("DATA must be numeric"))?;
            let HostData::U16(samples) = &array.data else {
                return Err(DaqError::usage("DATA must be a uint16 array"));
            };
            if nlhs > 1 {
                return Err(DaqError::usage("DATA is only output of run OPTION"));
            }
            IclRequest::Run {
                rows: array.rows,
                cols: array.cols,
                buffer: samples.clone(),
            }
        }
        IclOption::Uninit => {
            if !args[1].is_empty() {
                return Err(DaqError::usage("Placeholder for [] input must be empty"));
            }
            if nlhs > 1 {
                return Err(DaqError::usage("STATUS is only output of uninit OPTION"));
            }
            IclRequest::Uninit
        }
    };

    Ok((hcam, request))
}

fn execute<S: PvcamSdk + ?Sized>(
    sdk: &mut S,
    hcam: i16,
    request: IclRequest,
    policy: &PollPolicy,
) -> Result<IclOutput, ScriptError> {
    match request {
        IclRequest::Full { script } => {
            let loaded = acquire_once(sdk, hcam, &script, policy)?;
            Ok(IclOutput::Acquired {
                buffer: loaded.buffer,
                rois: loaded.rois,
            })
        }
        IclRequest::Load { script } => {
            check_handle(sdk, hcam)?;
            let loaded = load_script(sdk, hcam, &script)?;
            Ok(IclOutput::Acquired {
                buffer: loaded.buffer,
                rois: loaded.rois,
            })
        }
        IclRequest::Run {
            rows,
            cols,
            mut buffer,
        } => {
            check_handle(sdk, hcam)?;
            run_script(sdk, hcam, &mut buffer, policy)?;
            Ok(IclOutput::Ran { rows, cols, buffer })
        }
        IclRequest::Uninit => {
            check_handle(sdk, hcam)?;
            uninit_script(sdk, hcam)?;
            Ok(IclOutput::Uninitialized)
        }
    }
}

fn flatten(option: IclOption, result: Result<IclOutput, ScriptError>, nlhs: usize) -> HostReply {
    match result {
        Ok(IclOutput::Acquired { buffer, rois }) => reply(
            vec![HostValue::u16_row(buffer), rois_value(&rois)],
            nlhs,
            Vec::new(),
        ),
        Ok(IclOutput::Ran { rows, cols, buffer }) => reply(
            vec![HostValue::Numeric(HostArray {
                rows,
                cols,
                data: HostData::U16(buffer),
            })],
            nlhs,
            Vec::new(),
        ),
        Ok(IclOutput::Uninitialized) => reply(vec![HostValue::double(1.0)], nlhs, Vec::new()),
        Err(e) => {
            let mut warnings = vec![e.to_string()];
            warnings.extend(e.diagnostic().and_then(|d| d.message()));
            let outputs = if option == IclOption::Uninit {
                vec![HostValue::double(0.0)]
            } else {
                vec![HostValue::u16_row(Vec::new()), HostValue::string("error")]
            };
            reply(outputs, nlhs, warnings)
        }
    }
}

/// ROI output: a struct array of `x`, `y`, `offset`, or `"no image"`.
pub fn rois_value(rois: &ScriptRois) -> HostValue {
    match rois {
        ScriptRois::NoImage => HostValue::string("no image"),
        ScriptRois::Regions(regions) => {
            let mut array = StructArray::new(["x", "y", "offset"]);
            for region in regions {
                array.push(vec![
                    HostValue::double(f64::from(region.x)),
                    HostValue::double(f64::from(region.y)),
                    HostValue::double(region.offset as f64),
                ]);
            }
            HostValue::Struct(array)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_driver_pvcam::RoiDescriptor;

    #[test]
    fn option_strings_round_trip() {
        for option in [
            IclOption::Full,
            IclOption::Load,
            IclOption::Run,
            IclOption::Uninit,
        ] {
            assert_eq!(IclOption::parse(option.as_str()), Some(option));
        }
        assert_eq!(IclOption::parse("FULL"), None);
    }

    #[test]
    fn no_image_is_a_string() {
        assert_eq!(rois_value(&ScriptRois::NoImage), HostValue::string("no image"));
    }

    #[test]
    fn regions_become_struct_elements() {
        let value = rois_value(&ScriptRois::Regions(vec![
            RoiDescriptor { x: 10, y: 10, offset: 0 },
            RoiDescriptor { x: 4, y: 2, offset: 100 },
        ]));
        let array = value.as_struct().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.fields(), ["x", "y", "offset"]);
        assert_eq!(array.get(1, "offset"), Some(&HostValue::double(100.0)));
        assert_eq!(array.get(1, "y"), Some(&HostValue::double(2.0)));
    }

    #[test]
    fn failure_fills_requested_slots_only() {
        let r = flatten(
            IclOption::Load,
            Err(ScriptError::ReadoutFailed),
            1,
        );
        assert_eq!(r.outputs, vec![HostValue::u16_row(Vec::new())]);
        assert_eq!(r.warnings, vec!["Camera readout failed".to_string()]);
    }
}
