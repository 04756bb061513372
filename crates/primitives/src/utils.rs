use ethers::types::{Address, Bytes};

/// Reads the address prefix of packed entity bytes (`initCode`,
/// `paymasterAndData`); `None` when the field is empty or too short.
pub fn get_address(bytes: &Bytes) -> Option<Address> {
    if bytes.len() >= 20 {
        Some(Address::from_slice(&bytes[0..20]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn address_prefix() {
        assert_eq!(get_address(&Bytes::default()), None);
        assert_eq!(get_address(&Bytes::from_str("0x1234").unwrap()), None);
        assert_eq!(
            get_address(
                &Bytes::from_str("0x9406cc6185a346906296840746125a0e449764545fbfb9cf").unwrap()
            ),
            Some(Address::from_str("0x9406cc6185a346906296840746125a0e44976454").unwrap())
        );
    }
}
