/// Generates the starting value of a key.
pub trait ParamGen {
    /// Should overwrite every element of `out` with a generated value.
    fn fill(&mut self, out: &mut [f32]);

    /// Generates `len` values.
    fn generate(&mut self, len: usize) -> Vec<f32> {
        let mut value = vec![0.; len];
        self.fill(&mut value);
        value
    }
}

/// Always generates the same value.
#[derive(Debug, Clone, Copy)]
pub struct ConstParamGen(pub f32);

impl ParamGen for ConstParamGen {
    fn fill(&mut self, out: &mut [f32]) {
        out.fill(self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_generates_len_values() {
        assert_eq!(ConstParamGen(1.5).generate(3), [1.5; 3]);
        assert!(ConstParamGen(0.).generate(0).is_empty());
    }
}
