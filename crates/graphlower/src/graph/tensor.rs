use std::sync::Arc;

use serde::{ser::SerializeStruct, Deserialize, Serialize};

/// Enumerates scalar element types a graph value may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F16,
    Bf16,
    F32,
    F64,
}

impl DType {
    /// Returns `true` for the 16-bit float types that are upcast around numerically sensitive
    /// steps.
    pub fn is_half(self) -> bool {
        matches!(self, DType::F16 | DType::Bf16)
    }

    /// ONNX `TensorProto.DataType` code, as carried by the `to` attribute of `Cast`.
    pub fn onnx_code(self) -> i64 {
        match self {
            DType::F32 => 1,
            DType::U8 => 2,
            DType::I8 => 3,
            DType::U16 => 4,
            DType::I16 => 5,
            DType::I32 => 6,
            DType::I64 => 7,
            DType::Bool => 9,
            DType::F16 => 10,
            DType::F64 => 11,
            DType::U32 => 12,
            DType::U64 => 13,
            DType::Bf16 => 16,
        }
    }

    pub fn from_onnx_code(code: i64) -> Option<Self> {
        let dtype = match code {
            1 => DType::F32,
            2 => DType::U8,
            3 => DType::I8,
            4 => DType::U16,
            5 => DType::I16,
            6 => DType::I32,
            7 => DType::I64,
            9 => DType::Bool,
            10 => DType::F16,
            11 => DType::F64,
            12 => DType::U32,
            13 => DType::U64,
            16 => DType::Bf16,
            _ => return None,
        };
        Some(dtype)
    }
}

/// Names a symbolic dynamic dimension (e.g. `batch`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimSymbol(Arc<str>);

impl DimSymbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::<str>::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for DimSymbol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DimSymbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(DimSymbol::new(name))
    }
}

/// Represents a single axis extent in a tensor shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Static(usize),
    Dynamic(DimSymbol),
}

impl Dimension {
    pub fn from_usize(value: usize) -> Self {
        Self::Static(value)
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Dynamic(DimSymbol::new(name))
    }

    pub fn as_static(&self) -> Option<usize> {
        match self {
            Dimension::Static(value) => Some(*value),
            Dimension::Dynamic(_) => None,
        }
    }
}

/// Logical tensor shape as an ordered list of dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<Dimension>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<Dimension>>) -> Self {
        Self { dims: dims.into() }
    }

    pub fn from_static(dims: &[usize]) -> Self {
        Self::new(dims.iter().copied().map(Dimension::from_usize).collect::<Vec<_>>())
    }

    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn dim(&self, axis: usize) -> Option<&Dimension> {
        self.dims.get(axis)
    }
}

/// Static metadata of a graph value: element type plus (possibly symbolic) shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorType {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorType {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self { dtype, shape }
    }

    pub fn with_dtype(&self, dtype: DType) -> Self {
        Self {
            dtype,
            shape: self.shape.clone(),
        }
    }
}

/// Dense constant tensor payload (little-endian element bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorLiteral {
    pub dtype: DType,
    pub dims: Vec<usize>,
    pub bytes: Arc<[u8]>,
}

impl TensorLiteral {
    pub fn new(dtype: DType, dims: Vec<usize>, bytes: Arc<[u8]>) -> Self {
        Self { dtype, dims, bytes }
    }

    /// Builds a float literal of `dtype` filled with `value`.
    ///
    /// Only `F32` and `F64` have a host encoding here; other dtypes return `None`.
    pub fn from_f64(dtype: DType, dims: Vec<usize>, value: f64) -> Option<Self> {
        let count: usize = dims.iter().product();
        let bytes = match dtype {
            DType::F32 => (0..count)
                .flat_map(|_| (value as f32).to_le_bytes())
                .collect::<Vec<u8>>(),
            DType::F64 => (0..count).flat_map(|_| value.to_le_bytes()).collect(),
            _ => return None,
        };
        Some(Self::new(dtype, dims, Arc::from(bytes)))
    }

    pub fn from_i64s(values: &[i64]) -> Self {
        let bytes = values
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect::<Vec<u8>>();
        Self::new(DType::I64, vec![values.len()], Arc::from(bytes))
    }

    pub fn tensor_type(&self) -> TensorType {
        TensorType::new(self.dtype, Shape::from_static(&self.dims))
    }

    /// Decodes integer payloads (`I32`/`I64`) into `i64` values.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        let bytes: &[u8] = self.bytes.as_ref();
        match self.dtype {
            DType::I64 => Some(
                bytes
                    .chunks_exact(8)
                    .map(|chunk| {
                        let mut raw = [0u8; 8];
                        raw.copy_from_slice(chunk);
                        i64::from_le_bytes(raw)
                    })
                    .collect(),
            ),
            DType::I32 => Some(
                bytes
                    .chunks_exact(4)
                    .map(|chunk| {
                        let mut raw = [0u8; 4];
                        raw.copy_from_slice(chunk);
                        i64::from(i32::from_le_bytes(raw))
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Decodes float payloads (`F32`/`F64`) into `f64` values.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        let bytes: &[u8] = self.bytes.as_ref();
        match self.dtype {
            DType::F32 => Some(
                bytes
                    .chunks_exact(4)
                    .map(|chunk| {
                        let mut raw = [0u8; 4];
                        raw.copy_from_slice(chunk);
                        f64::from(f32::from_le_bytes(raw))
                    })
                    .collect(),
            ),
            DType::F64 => Some(
                bytes
                    .chunks_exact(8)
                    .map(|chunk| {
                        let mut raw = [0u8; 8];
                        raw.copy_from_slice(chunk);
                        f64::from_le_bytes(raw)
                    })
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl Serialize for TensorLiteral {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("TensorLiteral", 3)?;
        state.serialize_field("dtype", &self.dtype)?;
        state.serialize_field("dims", &self.dims)?;
        state.serialize_field("bytes", &self.bytes.as_ref())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for TensorLiteral {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct TensorLiteralHelper {
            dtype: DType,
            dims: Vec<usize>,
            bytes: Vec<u8>,
        }

        let helper = TensorLiteralHelper::deserialize(deserializer)?;
        Ok(TensorLiteral {
            dtype: helper.dtype,
            dims: helper.dims,
            bytes: Arc::<[u8]>::from(helper.bytes),
        })
    }
}
