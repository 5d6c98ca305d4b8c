//! Tensor types handed to inference backends

/// Shape of a tensor, outermost dimension first (e.g. [1, 224, 224, 3]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorShape {
    pub dims: Vec<usize>,
}

impl TensorShape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// NHWC image input shape.
    pub fn image(height: usize, width: usize, channels: usize) -> Self {
        Self {
            dims: vec![1, height, width, channels],
        }
    }

    /// Total element count, or None on overflow.
    pub fn element_count(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Height/width/channels of an NHWC image shape, if this is one.
    pub fn hwc(&self) -> Option<(usize, usize, usize)> {
        match self.dims.as_slice() {
            [1, h, w, c] => Some((*h, *w, *c)),
            [h, w, c] => Some((*h, *w, *c)),
            _ => None,
        }
    }
}

/// A dense float tensor in the layout its shape declares.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub shape: TensorShape,
    pub data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor, checking that the data length matches the shape.
    pub fn new(shape: TensorShape, data: Vec<f32>) -> Result<Self, String> {
        let expected = shape
            .element_count()
            .ok_or_else(|| "Tensor shape overflows element count".to_string())?;
        if data.len() != expected {
            return Err(format!(
                "Tensor data length {} does not match shape {:?} ({} elements)",
                data.len(),
                shape.dims,
                expected
            ));
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: TensorShape) -> Result<Self, String> {
        let count = shape
            .element_count()
            .ok_or_else(|| "Tensor shape overflows element count".to_string())?;
        Ok(Self {
            shape,
            data: vec![0.0; count],
        })
    }
}
