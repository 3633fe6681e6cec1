//! Packaging (boxing) batch cost calculation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use backoffice_core::MaterialId;

use super::{add, div, ensure_non_negative, mul, sum};
use crate::error::{ChargeError, Result};

/// One packaging material consumed by every item in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub material_id: MaterialId,
    #[serde(default)]
    pub name: Option<String>,
    /// Units of material consumed per packed item.
    pub quantity_per_item: Decimal,
    pub cost_per_unit: Decimal,
}

/// A packaging run to be costed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxingInput {
    /// Number of items packed.
    pub batch_size: i64,
    pub materials: Vec<MaterialRequirement>,
    pub labor_hours: Decimal,
    pub labor_rate: Decimal,
}

/// Consumption and cost of one material over the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialLine {
    pub material_id: MaterialId,
    pub total_quantity: Decimal,
    pub total_cost: Decimal,
}

/// Cost breakdown for a packaging run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxingCost {
    pub batch_size: i64,
    pub materials: Vec<MaterialLine>,
    pub material_cost: Decimal,
    pub labor_cost: Decimal,
    pub total_cost: Decimal,
    /// Total cost divided by the number of packed items.
    pub cost_per_unit_output: Decimal,
}

/// Cost a packaging run.
///
/// # Errors
///
/// Returns `ChargeError::InvalidBatchSize` if `batch_size <= 0`, or
/// `ChargeError::InvalidInput` if any quantity, cost, or labor figure is
/// negative or too large to price.
pub fn calculate(input: &BoxingInput) -> Result<BoxingCost> {
    if input.batch_size <= 0 {
        return Err(ChargeError::InvalidBatchSize(input.batch_size));
    }
    ensure_non_negative(input.labor_hours, "labor_hours")?;
    ensure_non_negative(input.labor_rate, "labor_rate")?;

    let batch_size = Decimal::from(input.batch_size);
    let mut lines = Vec::with_capacity(input.materials.len());
    for material in &input.materials {
        ensure_non_negative(material.quantity_per_item, "materials.quantity_per_item")?;
        ensure_non_negative(material.cost_per_unit, "materials.cost_per_unit")?;

        let total_quantity = mul(material.quantity_per_item, batch_size, "material quantity")?;
        lines.push(MaterialLine {
            material_id: material.material_id,
            total_quantity,
            total_cost: mul(total_quantity, material.cost_per_unit, "material cost")?,
        });
    }

    let material_cost = sum(lines.iter().map(|line| line.total_cost), "material_cost")?;
    let labor_cost = mul(input.labor_hours, input.labor_rate, "labor_cost")?;
    let total_cost = add(material_cost, labor_cost, "total_cost")?;

    Ok(BoxingCost {
        batch_size: input.batch_size,
        materials: lines,
        material_cost,
        labor_cost,
        total_cost,
        cost_per_unit_output: div(total_cost, batch_size, "cost_per_unit_output")?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::error::ErrorKind;

    fn carton() -> MaterialRequirement {
        MaterialRequirement {
            material_id: MaterialId::new(10),
            name: Some("carton".to_string()),
            quantity_per_item: dec!(2),
            cost_per_unit: dec!(50),
        }
    }

    #[test]
    fn test_reference_batch() {
        let cost = calculate(&BoxingInput {
            batch_size: 100,
            materials: vec![carton()],
            labor_hours: dec!(8),
            labor_rate: dec!(1500),
        })
        .unwrap();

        assert_eq!(cost.material_cost, dec!(10000));
        assert_eq!(cost.labor_cost, dec!(12000));
        assert_eq!(cost.total_cost, dec!(22000));
        assert_eq!(cost.cost_per_unit_output, dec!(220));
        assert_eq!(cost.materials[0].total_quantity, dec!(200));
    }

    #[test]
    fn test_multiple_materials_are_summed() {
        let tape = MaterialRequirement {
            material_id: MaterialId::new(11),
            name: None,
            quantity_per_item: dec!(0.5),
            cost_per_unit: dec!(12),
        };
        let cost = calculate(&BoxingInput {
            batch_size: 40,
            materials: vec![carton(), tape],
            labor_hours: dec!(0),
            labor_rate: dec!(1500),
        })
        .unwrap();

        // 2 × 50 × 40 + 0.5 × 12 × 40
        assert_eq!(cost.material_cost, dec!(4240));
        assert_eq!(cost.total_cost, dec!(4240));
        assert_eq!(cost.cost_per_unit_output, dec!(106));
    }

    #[test]
    fn test_non_positive_batch_size() {
        for size in [0, -5] {
            let err = calculate(&BoxingInput {
                batch_size: size,
                materials: vec![carton()],
                labor_hours: dec!(1),
                labor_rate: dec!(1),
            })
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidBatchSize);
        }
    }

    #[test]
    fn test_extreme_labor_hours_rejected() {
        let err = calculate(&BoxingInput {
            batch_size: 10,
            materials: vec![carton()],
            labor_hours: Decimal::MAX,
            labor_rate: dec!(1500),
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let mut bulk_material = carton();
        bulk_material.quantity_per_item = Decimal::MAX;
        let err = calculate(&BoxingInput {
            batch_size: 10,
            materials: vec![bulk_material],
            labor_hours: dec!(1),
            labor_rate: dec!(1),
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_negative_material_cost_rejected() {
        let mut material = carton();
        material.cost_per_unit = dec!(-1);
        let err = calculate(&BoxingInput {
            batch_size: 10,
            materials: vec![material],
            labor_hours: dec!(1),
            labor_rate: dec!(1),
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
