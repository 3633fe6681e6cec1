//! Payroll cost calculation for one employee and one pay period.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use backoffice_core::EmployeeId;

use super::{div, ensure_non_negative, ensure_positive, mul, sub, sum};
use crate::error::{ChargeError, Result};

/// Overtime multiplier applied when the input does not set one.
pub const DEFAULT_OVERTIME_MULTIPLIER: Decimal = Decimal::from_parts(15, 0, 0, false, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayFrequency {
    Weekly,
    Biweekly,
    #[default]
    Monthly,
    Quarterly,
}

impl PayFrequency {
    /// Canonical working days in one period.
    #[must_use]
    pub const fn default_work_days(self) -> Decimal {
        match self {
            Self::Weekly => Decimal::from_parts(5, 0, 0, false, 0),
            Self::Biweekly => Decimal::from_parts(10, 0, 0, false, 0),
            Self::Monthly => Decimal::from_parts(22, 0, 0, false, 0),
            Self::Quarterly => Decimal::from_parts(66, 0, 0, false, 0),
        }
    }

    /// Canonical working hours in one period (eight hours a day).
    #[must_use]
    pub const fn default_work_hours(self) -> Decimal {
        match self {
            Self::Weekly => Decimal::from_parts(40, 0, 0, false, 0),
            Self::Biweekly => Decimal::from_parts(80, 0, 0, false, 0),
            Self::Monthly => Decimal::from_parts(176, 0, 0, false, 0),
            Self::Quarterly => Decimal::from_parts(528, 0, 0, false, 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Allowances {
    pub transport: Decimal,
    pub meal: Decimal,
    pub housing: Decimal,
    pub performance_bonus: Decimal,
    pub special_bonus: Decimal,
    pub commission: Decimal,
}

impl Allowances {
    fn entries(&self) -> [(&'static str, Decimal); 6] {
        [
            ("allowances.transport", self.transport),
            ("allowances.meal", self.meal),
            ("allowances.housing", self.housing),
            ("allowances.performance_bonus", self.performance_bonus),
            ("allowances.special_bonus", self.special_bonus),
            ("allowances.commission", self.commission),
        ]
    }

    /// Sum of all allowances.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidInput` if the sum overflows.
    pub fn total(&self) -> Result<Decimal> {
        sum(self.entries().map(|(_, amount)| amount), "total_allowances")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Deductions {
    pub social_security: Decimal,
    pub tax: Decimal,
    pub insurance: Decimal,
    /// Repayment of a salary advance.
    pub advance: Decimal,
    pub other: Decimal,
}

impl Deductions {
    fn entries(&self) -> [(&'static str, Decimal); 5] {
        [
            ("deductions.social_security", self.social_security),
            ("deductions.tax", self.tax),
            ("deductions.insurance", self.insurance),
            ("deductions.advance", self.advance),
            ("deductions.other", self.other),
        ]
    }

    /// Sum of all deductions.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidInput` if the sum overflows.
    pub fn total(&self) -> Result<Decimal> {
        sum(self.entries().map(|(_, amount)| amount), "total_deductions")
    }
}

/// One employee's pay period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryInput {
    pub employee_id: EmployeeId,
    #[serde(default)]
    pub pay_frequency: PayFrequency,
    pub base_salary: Decimal,
    #[serde(default)]
    pub overtime_hours: Decimal,
    /// Multiplier on the hourly rate for overtime; defaults to 1.5.
    #[serde(default)]
    pub overtime_multiplier: Option<Decimal>,
    /// Overrides the frequency's canonical working days.
    #[serde(default)]
    pub work_days: Option<Decimal>,
    /// Overrides the frequency's canonical working hours.
    #[serde(default)]
    pub work_hours: Option<Decimal>,
    #[serde(default)]
    pub absent_days: Decimal,
    #[serde(default)]
    pub allowances: Allowances,
    #[serde(default)]
    pub deductions: Deductions,
}

/// Pay breakdown for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryCost {
    pub employee_id: EmployeeId,
    pub pay_frequency: PayFrequency,
    pub work_days: Decimal,
    pub work_hours: Decimal,
    pub hours_worked: Decimal,
    pub overtime_rate: Decimal,
    pub base_amount: Decimal,
    pub overtime_amount: Decimal,
    pub total_allowances: Decimal,
    pub total_deductions: Decimal,
    pub gross_amount: Decimal,
    pub net_amount: Decimal,
    pub effective_hourly_rate: Decimal,
}

impl SalaryCost {
    /// Employer cost booked for a payroll charge.
    #[must_use]
    pub const fn total_cost(&self) -> Decimal {
        self.gross_amount
    }
}

/// Compute one employee's pay for one period.
///
/// # Errors
///
/// Returns `ChargeError::InvalidInput` if the base salary, overtime, an
/// allowance, a deduction, or the absence count is negative; if working days
/// or hours are not positive; if absences exceed working days; or if a figure
/// is too large to compute.
pub fn calculate(input: &SalaryInput) -> Result<SalaryCost> {
    ensure_non_negative(input.base_salary, "base_salary")?;
    ensure_non_negative(input.overtime_hours, "overtime_hours")?;
    ensure_non_negative(input.absent_days, "absent_days")?;
    for (field, amount) in input.allowances.entries() {
        ensure_non_negative(amount, field)?;
    }
    for (field, amount) in input.deductions.entries() {
        ensure_non_negative(amount, field)?;
    }

    let work_days = input
        .work_days
        .unwrap_or_else(|| input.pay_frequency.default_work_days());
    let work_hours = input
        .work_hours
        .unwrap_or_else(|| input.pay_frequency.default_work_hours());
    ensure_positive(work_days, "work_days")?;
    ensure_positive(work_hours, "work_hours")?;
    if input.absent_days > work_days {
        return Err(ChargeError::invalid_input(format!(
            "absent_days ({}) exceeds work_days ({work_days})",
            input.absent_days
        )));
    }

    let multiplier = input
        .overtime_multiplier
        .unwrap_or(DEFAULT_OVERTIME_MULTIPLIER);
    ensure_non_negative(multiplier, "overtime_multiplier")?;

    let hourly_base = div(input.base_salary, work_hours, "overtime_rate")?;
    let overtime_rate = mul(hourly_base, multiplier, "overtime_rate")?;
    let base_amount = input.base_salary;
    let overtime_amount = mul(input.overtime_hours, overtime_rate, "overtime_amount")?;
    let total_allowances = input.allowances.total()?;
    let total_deductions = input.deductions.total()?;
    let gross_amount = sum([base_amount, overtime_amount, total_allowances], "gross_amount")?;
    let net_amount = sub(gross_amount, total_deductions, "net_amount")?;

    let hours_per_day = div(work_hours, work_days, "hours_worked")?;
    let hours_absent = mul(input.absent_days, hours_per_day, "hours_worked")?;
    let hours_worked = sub(work_hours, hours_absent, "hours_worked")?;
    let effective_hourly_rate = if hours_worked > Decimal::ZERO {
        div(gross_amount, hours_worked, "effective_hourly_rate")?
    } else {
        Decimal::ZERO
    };

    Ok(SalaryCost {
        employee_id: input.employee_id,
        pay_frequency: input.pay_frequency,
        work_days,
        work_hours,
        hours_worked,
        overtime_rate,
        base_amount,
        overtime_amount,
        total_allowances,
        total_deductions,
        gross_amount,
        net_amount,
        effective_hourly_rate,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::error::ErrorKind;

    fn monthly(base: Decimal) -> SalaryInput {
        SalaryInput {
            employee_id: EmployeeId::new(7),
            pay_frequency: PayFrequency::Monthly,
            base_salary: base,
            overtime_hours: Decimal::ZERO,
            overtime_multiplier: None,
            work_days: None,
            work_hours: None,
            absent_days: Decimal::ZERO,
            allowances: Allowances::default(),
            deductions: Deductions::default(),
        }
    }

    #[test]
    fn test_frequency_defaults() {
        assert_eq!(PayFrequency::Weekly.default_work_days(), dec!(5));
        assert_eq!(PayFrequency::Biweekly.default_work_hours(), dec!(80));
        assert_eq!(PayFrequency::Monthly.default_work_hours(), dec!(176));
        assert_eq!(PayFrequency::Quarterly.default_work_days(), dec!(66));
    }

    #[test]
    fn test_full_month_with_overtime_allowances_and_deductions() {
        let mut input = monthly(dec!(52800));
        input.overtime_hours = dec!(10);
        input.allowances = Allowances {
            transport: dec!(3000),
            meal: dec!(2000),
            ..Allowances::default()
        };
        input.deductions = Deductions {
            social_security: dec!(4752),
            tax: dec!(5000),
            ..Deductions::default()
        };

        let cost = calculate(&input).unwrap();
        // 52800 / 176 × 1.5
        assert_eq!(cost.overtime_rate, dec!(450));
        assert_eq!(cost.overtime_amount, dec!(4500));
        assert_eq!(cost.total_allowances, dec!(5000));
        assert_eq!(cost.gross_amount, dec!(62300));
        assert_eq!(cost.total_deductions, dec!(9752));
        assert_eq!(cost.net_amount, dec!(52548));
        assert_eq!(cost.total_cost(), cost.gross_amount);
    }

    #[test]
    fn test_net_is_gross_minus_deductions_when_all_zero() {
        let cost = calculate(&monthly(Decimal::ZERO)).unwrap();
        assert_eq!(cost.net_amount, cost.gross_amount - cost.total_deductions);
        assert_eq!(cost.net_amount, Decimal::ZERO);
        assert_eq!(cost.effective_hourly_rate, Decimal::ZERO);
    }

    #[test]
    fn test_absences_reduce_hours_worked() {
        let mut input = monthly(dec!(44000));
        input.absent_days = dec!(2);

        let cost = calculate(&input).unwrap();
        assert_eq!(cost.hours_worked, dec!(160));
        assert_eq!(cost.effective_hourly_rate, dec!(275));
    }

    #[test]
    fn test_custom_schedule_overrides_frequency() {
        let mut input = monthly(dec!(30000));
        input.work_days = Some(dec!(20));
        input.work_hours = Some(dec!(150));
        input.overtime_multiplier = Some(dec!(2));
        input.overtime_hours = dec!(3);

        let cost = calculate(&input).unwrap();
        assert_eq!(cost.overtime_rate, dec!(400));
        assert_eq!(cost.overtime_amount, dec!(1200));
    }

    #[test]
    fn test_negative_base_salary_rejected() {
        let err = calculate(&monthly(dec!(-1))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_absences_beyond_schedule_rejected() {
        let mut input = monthly(dec!(1000));
        input.absent_days = dec!(23);
        assert!(calculate(&input).is_err());
    }

    #[test]
    fn test_extreme_figures_rejected() {
        let mut overtime = monthly(dec!(52800));
        overtime.overtime_hours = Decimal::MAX;
        assert_eq!(calculate(&overtime).unwrap_err().kind(), ErrorKind::InvalidInput);

        let mut allowances = monthly(Decimal::MAX);
        allowances.allowances.transport = Decimal::MAX;
        assert_eq!(calculate(&allowances).unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
