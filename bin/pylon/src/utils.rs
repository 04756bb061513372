use ethers::types::Address;
use pylon_bundler::ReceiptTimeoutPolicy;
use std::str::FromStr;

pub fn parse_address(s: &str) -> Result<Address, String> {
    Address::from_str(s).map_err(|_| format!("address {s} is not valid"))
}

pub fn parse_timeout_policy(s: &str) -> Result<ReceiptTimeoutPolicy, String> {
    match s {
        "requeue" => Ok(ReceiptTimeoutPolicy::Requeue),
        "fail" => Ok(ReceiptTimeoutPolicy::Fail),
        other => Err(format!("unknown receipt timeout policy: {other} (expected requeue or fail)")),
    }
}
