use std::fmt;

use crate::error::CnpjError;
use crate::utils::only_digits;

const PESOS_DV1: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const PESOS_DV2: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// CNPJ completo com 14 dígitos: básico (8), ordem (4) e DV (2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cnpj(String);

impl Cnpj {
    /// Aceita o número com ou sem pontuação.
    pub fn parse(input: &str) -> Result<Self, CnpjError> {
        let digits = only_digits(input);
        if digits.len() != 14 {
            return Err(CnpjError::InvalidCnpj(input.to_string()));
        }
        Ok(Self(digits))
    }

    pub fn basico(&self) -> &str {
        &self.0[..8]
    }

    pub fn ordem(&self) -> &str {
        &self.0[8..12]
    }

    pub fn dv(&self) -> &str {
        &self.0[12..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn formatted(&self) -> String {
        let c = &self.0;
        format!(
            "{}.{}.{}/{}-{}",
            &c[..2],
            &c[2..5],
            &c[5..8],
            &c[8..12],
            &c[12..]
        )
    }

    pub fn has_valid_check_digits(&self) -> bool {
        let digits: Vec<u32> = self.0.chars().filter_map(|c| c.to_digit(10)).collect();
        if digits.windows(2).all(|w| w[0] == w[1]) {
            return false;
        }
        let dv1 = check_digit(&digits[..12], &PESOS_DV1);
        let dv2 = check_digit(&digits[..13], &PESOS_DV2);
        digits[12] == dv1 && digits[13] == dv2
    }
}

fn check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    let rest = sum % 11;
    if rest < 2 {
        0
    } else {
        11 - rest
    }
}

impl fmt::Display for Cnpj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
