use std::str::FromStr;

use ethers::types::{Address, U256};
use rust_decimal::Decimal;

use crate::error::{AppError, Result};

/// 10^decimals as an exact decimal.
fn unit(decimals: u8) -> Decimal {
    Decimal::from_i128_with_scale(10i128.pow(decimals as u32), 0)
}

/// Convert a display-unit amount to base units, flooring any fractional
/// remainder below one base unit.
pub fn to_wei(amount: Decimal, decimals: u8) -> U256 {
    let scaled = (amount * unit(decimals)).trunc();
    U256::from_dec_str(&scaled.normalize().to_string()).unwrap_or_default()
}

/// Convert base units back to display units. Exact division.
pub fn to_eth(value: &U256, decimals: u8) -> Decimal {
    let num = Decimal::from_str(&value.to_string()).unwrap_or_default();
    num / unit(decimals)
}

/// Same as [`to_eth`] for values already held as decimal strings.
pub fn str_to_eth(value: &str, decimals: u8) -> Decimal {
    let num = Decimal::from_str(value).unwrap_or_default();
    num / unit(decimals)
}

/// Gas cost in native base units.
pub fn calc_gas_cost(gas_limit: u64, gas_price: U256) -> U256 {
    U256::from(gas_limit) * gas_price
}

/// Parse a 20-byte hex address, rejecting anything else with a
/// user-visible validation error.
pub fn parse_address(address: &str) -> Result<Address> {
    address
        .parse::<Address>()
        .map_err(|_| AppError::validation("invalid destination address provided"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_wei_scales_display_units() {
        let amount = Decimal::from_str("10.5").unwrap();
        assert_eq!(to_wei(amount, 18), U256::from_dec_str("10500000000000000000").unwrap());
        assert_eq!(to_wei(Decimal::from(3), 6), U256::from(3_000_000u64));
    }

    #[test]
    fn to_wei_floors_sub_unit_fractions() {
        let amount = Decimal::from_str("0.0000005").unwrap();
        assert_eq!(to_wei(amount, 6), U256::zero());
    }

    #[test]
    fn wei_round_trips_through_eth() {
        let value = U256::from_dec_str("123456789012345678").unwrap();
        for decimals in [6u8, 8, 18] {
            let eth = to_eth(&value, decimals);
            assert_eq!(to_wei(eth, decimals), value);
        }
    }

    #[test]
    fn gas_cost_is_limit_times_price() {
        let cost = calc_gas_cost(21_000, U256::from(50_000_000_000u64));
        assert_eq!(cost, U256::from_dec_str("1050000000000000").unwrap());
    }

    #[test]
    fn address_parsing_rejects_malformed_input() {
        assert!(parse_address("0x1111111111111111111111111111111111111111").is_ok());
        assert!(parse_address("0x1111").is_err());
        assert!(parse_address("not-an-address").is_err());
    }
}
