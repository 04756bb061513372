use ethers::{
    prelude::k256::ecdsa::SigningKey,
    signers::{LocalWallet, Signer},
    types::Address,
};

/// Wrapper around the bundler's signing key.
#[derive(Clone, Debug)]
pub struct Wallet {
    /// Signing key of the wallet
    pub signer: ethers::signers::Wallet<SigningKey>,
}

impl Wallet {
    /// Create a new wallet from the given private key
    pub fn from_key(key: &str, chain_id: u64) -> eyre::Result<Self> {
        let wallet = key.parse::<LocalWallet>()?;
        Ok(Self { signer: wallet.with_chain_id(chain_id) })
    }

    /// Address of the signing key; the default beneficiary
    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_from_key() {
        // well-known anvil dev key
        let wallet = Wallet::from_key(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            31_337,
        )
        .unwrap();
        assert_eq!(
            wallet.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap()
        );
    }

    #[test]
    fn rejects_malformed_key() {
        assert!(Wallet::from_key("0xnotakey", 1).is_err());
    }
}
