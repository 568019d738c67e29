use super::StepError;
use crate::compute::{apply_formula, compile};
use crate::store::MultiEntityData;

pub fn apply(text: &str, input: &MultiEntityData) -> Result<MultiEntityData, StepError> {
    let expr = compile(text).map_err(|source| StepError::Formula { text: text.to_string(), source })?;
    Ok(apply_formula(&expr, input))
}
