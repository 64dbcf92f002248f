//! The statistical predictor bank: a chain of up to 255 components,
//! declared in the block header, each contributing one
//! stretched-space prediction per bit and updating its state against the
//! actual bit afterward, in declaration order.

pub mod components;
pub mod tables;

use crate::error::FormatError;
use components::{Component, ComponentSpec};
use tables::Tables;

/// A parsed, validated predictor bank topology plus its live state.
pub struct PredictorBank {
    components: Vec<Component>,
    pr: Vec<i32>,
    tables: Tables,
    /// Partial-byte state: a leading 1 bit followed by the bits coded so
    /// far within the current byte, MSB-first. Resets to 1 every 8 bits.
    hmap4: u32,
}

impl PredictorBank {
    /// Validate and build a bank from its header-declared specs. Enforces
    /// "component i may reference only components j with j < i".
    pub fn new(specs: Vec<ComponentSpec>) -> Result<Self, FormatError> {
        if specs.is_empty() || specs.len() > 255 {
            return Err(FormatError::HeaderSizeMismatch { declared: specs.len(), actual: specs.len() });
        }
        for (i, spec) in specs.iter().enumerate() {
            for j in spec.inputs() {
                if j as usize >= i {
                    return Err(FormatError::BadComponentReference { index: i, target: j as usize });
                }
            }
        }
        let components: Vec<Component> = specs.into_iter().map(Component::new).collect();
        let tables = Tables::new();
        tables.self_test();
        let pr = vec![0; components.len()];
        Ok(Self { pr, components, tables, hmap4: 1 })
    }

    fn ensure_pr_len(&mut self) {
        if self.pr.len() != self.components.len() {
            self.pr = vec![0; self.components.len()];
        }
    }

    /// Compute every component's prediction in order and return the
    /// 16-bit probability (that the next bit is 1) the arithmetic coder
    /// should use, from the last component's output.
    pub fn predict(&mut self, h: &[u32]) -> u16 {
        self.ensure_pr_len();
        for i in 0..self.components.len() {
            let hv = *h.get(i).unwrap_or(&0);
            let p = self.components[i].predict(hv, self.hmap4, &self.tables, &self.pr);
            self.pr[i] = p;
        }
        let last = *self.pr.last().unwrap_or(&0);
        self.tables.squash16(last)
    }

    /// Feed the actual coded bit back to every component, then advance
    /// the partial-byte state.
    pub fn update_bit(&mut self, bit: u8) {
        for c in &mut self.components {
            c.update(bit);
        }
        self.hmap4 = (self.hmap4 << 1) | bit as u32;
        if self.hmap4 >= 0x100 {
            self.hmap4 = 1;
        }
    }

    /// True exactly when the last `update_bit` completed a byte (hmap4
    /// was reset), i.e. the host should now run HCOMP/PCOMP for the next
    /// byte and call [`Self::on_byte`].
    pub fn at_byte_boundary(&self) -> bool {
        self.hmap4 == 1
    }

    pub fn on_byte(&mut self, byte: u8) {
        for c in &mut self.components {
            c.on_byte(byte);
        }
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_bank() -> PredictorBank {
        PredictorBank::new(vec![ComponentSpec::Cm { s: 8, limit: 200 }]).unwrap()
    }

    #[test]
    fn forward_only_reference_is_enforced() {
        let specs = vec![
            ComponentSpec::Cm { s: 4, limit: 50 },
            ComponentSpec::Mix2 { s: 2, j: 0, k: 1, rate: 7, mask: 0 },
        ];
        assert!(matches!(
            PredictorBank::new(specs),
            Err(FormatError::BadComponentReference { index: 1, target: 1 })
        ));
    }

    #[test]
    fn predict_then_update_is_deterministic() {
        let mut a = simple_bank();
        let mut b = simple_bank();
        let h = [42u32];
        for bit in [1u8, 0, 1, 1, 0, 0, 1, 0] {
            assert_eq!(a.predict(&h), b.predict(&h));
            a.update_bit(bit);
            b.update_bit(bit);
        }
    }

    #[test]
    fn byte_boundary_fires_every_eight_bits() {
        let mut bank = simple_bank();
        let h = [0u32];
        for i in 0..8 {
            bank.predict(&h);
            bank.update_bit((i % 2) as u8);
            if i < 7 {
                assert!(!bank.at_byte_boundary());
            }
        }
        assert!(bank.at_byte_boundary());
    }
}
