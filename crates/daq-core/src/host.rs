//! Host value model.
//!
//! The bindings are called from a numeric computing environment whose values
//! are typed arrays, character strings and struct arrays. Gateways receive
//! their arguments as [`HostValue`]s and hand back a [`HostReply`]; the glue
//! that converts to and from the host runtime's native representation lives
//! outside this workspace.
//!
//! Arrays are stored row-major with explicit `rows`/`cols`. The host's empty
//! matrix `[]` is a 0×0 double array (see [`HostValue::empty`]).

use serde::{Deserialize, Serialize};

/// Element storage for a numeric host array.
///
/// Native sample widths are kept as-is so camera data (U16) and photon
/// histograms (U32) travel without conversion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostData {
    /// 16-bit unsigned samples (camera pixels)
    U16(Vec<u16>),
    /// 32-bit unsigned samples (histogram counts)
    U32(Vec<u32>),
    /// Single precision floats
    Single(Vec<f32>),
    /// Double precision floats (the host default class)
    Double(Vec<f64>),
}

impl HostData {
    /// Number of stored samples.
    pub fn len(&self) -> usize {
        match self {
            HostData::U16(v) => v.len(),
            HostData::U32(v) => v.len(),
            HostData::Single(v) => v.len(),
            HostData::Double(v) => v.len(),
        }
    }

    /// True when no samples are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Host class name, as reported by the host's `class()` function.
    pub fn class_name(&self) -> &'static str {
        match self {
            HostData::U16(_) => "uint16",
            HostData::U32(_) => "uint32",
            HostData::Single(_) => "single",
            HostData::Double(_) => "double",
        }
    }

    fn first_as_f64(&self) -> Option<f64> {
        match self {
            HostData::U16(v) => v.first().map(|&x| f64::from(x)),
            HostData::U32(v) => v.first().map(|&x| f64::from(x)),
            HostData::Single(v) => v.first().map(|&x| f64::from(x)),
            HostData::Double(v) => v.first().copied(),
        }
    }
}

/// A two-dimensional numeric array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostArray {
    /// Row count.
    pub rows: usize,
    /// Column count.
    pub cols: usize,
    /// Samples, row-major.
    pub data: HostData,
}

impl HostArray {
    /// 1×N row vector, or 0×0 when `data` is empty.
    ///
    /// The host distinguishes a 1×0 vector from `[]`; acquisition outputs are
    /// always collapsed to 0×0 when they hold no samples.
    pub fn row(data: HostData) -> Self {
        let n = data.len();
        if n == 0 {
            Self { rows: 0, cols: 0, data }
        } else {
            Self { rows: 1, cols: n, data }
        }
    }

    /// `rows * cols`, saturating at `usize::MAX`.
    pub fn numel(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }
}

/// A 1×N struct array with a fixed field list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructArray {
    fields: Vec<String>,
    records: Vec<Vec<HostValue>>,
}

impl StructArray {
    /// Empty struct array with the given field names.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            records: Vec::new(),
        }
    }

    /// Append one element. Values are given in field order; missing trailing
    /// values are filled with `[]`.
    pub fn push(&mut self, mut values: Vec<HostValue>) {
        values.resize(self.fields.len(), HostValue::empty());
        self.records.push(values);
    }

    /// Field names, in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Field `name` of element `index`.
    pub fn get(&self, index: usize, name: &str) -> Option<&HostValue> {
        let column = self.fields.iter().position(|f| f == name)?;
        self.records.get(index)?.get(column)
    }
}

/// Any value that crosses the host boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostValue {
    /// Numeric array of any class.
    Numeric(HostArray),
    /// Character row vector.
    Char(String),
    /// Struct array.
    Struct(StructArray),
}

impl HostValue {
    /// The host's empty matrix `[]`.
    pub fn empty() -> Self {
        HostValue::Numeric(HostArray {
            rows: 0,
            cols: 0,
            data: HostData::Double(Vec::new()),
        })
    }

    /// 1×1 double scalar.
    pub fn double(value: f64) -> Self {
        HostValue::Numeric(HostArray {
            rows: 1,
            cols: 1,
            data: HostData::Double(vec![value]),
        })
    }

    /// 1×1 single scalar.
    pub fn single(value: f32) -> Self {
        HostValue::Numeric(HostArray {
            rows: 1,
            cols: 1,
            data: HostData::Single(vec![value]),
        })
    }

    /// Pixel data as a row vector (0×0 when empty).
    pub fn u16_row(samples: Vec<u16>) -> Self {
        HostValue::Numeric(HostArray::row(HostData::U16(samples)))
    }

    /// Histogram counts as a row vector (0×0 when empty).
    pub fn u32_row(counts: Vec<u32>) -> Self {
        HostValue::Numeric(HostArray::row(HostData::U32(counts)))
    }

    /// Character array holding `text`.
    pub fn string(text: impl Into<String>) -> Self {
        HostValue::Char(text.into())
    }

    /// True for numeric arrays.
    pub fn is_numeric(&self) -> bool {
        matches!(self, HostValue::Numeric(_))
    }

    /// True for character arrays.
    pub fn is_char(&self) -> bool {
        matches!(self, HostValue::Char(_))
    }

    /// Number of elements, following the host's `numel`.
    pub fn numel(&self) -> usize {
        match self {
            HostValue::Numeric(a) => a.numel(),
            HostValue::Char(s) => s.chars().count(),
            HostValue::Struct(s) => s.len(),
        }
    }

    /// True when [`numel`](Self::numel) is zero.
    pub fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    /// The first element as a double, for numeric values only.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            HostValue::Numeric(a) => a.data.first_as_f64(),
            _ => None,
        }
    }

    /// Text of a character array.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Char(s) => Some(s),
            _ => None,
        }
    }

    /// Underlying array of a numeric value.
    pub fn as_array(&self) -> Option<&HostArray> {
        match self {
            HostValue::Numeric(a) => Some(a),
            _ => None,
        }
    }

    /// Underlying struct array.
    pub fn as_struct(&self) -> Option<&StructArray> {
        match self {
            HostValue::Struct(s) => Some(s),
            _ => None,
        }
    }
}

/// Result of a gateway call: the output slots plus non-fatal warnings.
///
/// Warnings correspond to messages the host prints without aborting the call,
/// such as driver failures under the empty/`"error"` output convention or
/// script error locations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HostReply {
    /// Output slots, in order.
    pub outputs: Vec<HostValue>,
    /// Messages printed by the host without failing the call.
    pub warnings: Vec<String>,
}

impl HostReply {
    /// Output slot `index`, if present.
    pub fn output(&self, index: usize) -> Option<&HostValue> {
        self.outputs.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matrix_is_numeric_and_empty() {
        let v = HostValue::empty();
        assert!(v.is_numeric());
        assert!(v.is_empty());
        assert_eq!(v.as_scalar(), None);
    }

    #[test]
    fn row_vectors_collapse_to_zero_by_zero() {
        let HostValue::Numeric(a) = HostValue::u16_row(Vec::new()) else {
            panic!("expected numeric");
        };
        assert_eq!((a.rows, a.cols), (0, 0));

        let HostValue::Numeric(a) = HostValue::u16_row(vec![1, 2, 3]) else {
            panic!("expected numeric");
        };
        assert_eq!((a.rows, a.cols), (1, 3));
        assert_eq!(a.data.class_name(), "uint16");
    }

    #[test]
    fn struct_array_field_lookup() {
        let mut rois = StructArray::new(["x", "y", "offset"]);
        rois.push(vec![
            HostValue::double(10.0),
            HostValue::double(20.0),
            HostValue::double(0.0),
        ]);
        rois.push(vec![HostValue::double(5.0)]);

        assert_eq!(rois.len(), 2);
        assert_eq!(rois.get(0, "y").and_then(HostValue::as_scalar), Some(20.0));
        assert_eq!(rois.get(1, "x").and_then(HostValue::as_scalar), Some(5.0));
        assert!(rois.get(1, "offset").is_some_and(HostValue::is_empty));
        assert!(rois.get(0, "width").is_none());
    }

    #[test]
    fn numel_saturates_instead_of_overflowing() {
        let huge = HostArray {
            rows: usize::MAX,
            cols: 2,
            data: HostData::Double(Vec::new()),
        };
        assert_eq!(huge.numel(), usize::MAX);
        assert!(!HostValue::Numeric(huge).is_empty());

        let no_rows = HostArray {
            rows: 0,
            cols: usize::MAX,
            data: HostData::Double(Vec::new()),
        };
        assert_eq!(no_rows.numel(), 0);
    }

    #[test]
    fn char_numel_counts_characters() {
        assert_eq!(HostValue::string("full").numel(), 4);
        assert!(HostValue::string("").is_empty());
    }

    #[test]
    fn host_reply_serializes_to_json() {
        let reply = HostReply {
            outputs: vec![HostValue::string("no image")],
            warnings: vec![],
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("no image"));
    }
}
