use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use alloy_primitives::{Address, B256, Bytes, address};

/// System contract every deployment goes through.
pub const CONTRACT_DEPLOYER_ADDRESS: Address = address!("0000000000000000000000000000000000008006");

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);

    event ContractDeployed(
        address indexed deployerAddress,
        bytes32 indexed bytecodeHash,
        address indexed contractAddress
    );

    function create(bytes32 _salt, bytes32 _bytecodeHash, bytes _input);
    function create2(bytes32 _salt, bytes32 _bytecodeHash, bytes _input);
}

/// ERC20 `Transfer` shape: signature topic, two indexed addresses and a
/// single word of data. ERC721 transfers share the signature but index the
/// token id, so they fail the topic count.
pub fn is_transfer_log(topics: &[B256], data: &[u8]) -> bool {
    topics.len() == 3 && topics[0] == Transfer::SIGNATURE_HASH && data.len() == 32
}

pub fn decode_transfer_event(topics: &[B256], data: &[u8]) -> anyhow::Result<Transfer> {
    let decoded = Transfer::decode_raw_log(topics, data)?;
    Ok(decoded)
}

/// Address of the contract announced by a `ContractDeployed` log.
pub fn deployed_contract(emitter: &Address, topics: &[B256]) -> Option<Address> {
    if *emitter != CONTRACT_DEPLOYER_ADDRESS
        || topics.len() != 4
        || topics[0] != ContractDeployed::SIGNATURE_HASH
    {
        return None;
    }
    Some(Address::from_word(topics[3]))
}

/// Constructor input of a deployer call, empty for any other calldata.
pub fn constructor_input(calldata: &[u8]) -> Bytes {
    if let Ok(call) = createCall::abi_decode(calldata) {
        return call._input;
    }
    if let Ok(call) = create2Call::abi_decode(calldata) {
        return call._input;
    }
    Bytes::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn decodes_erc20_transfer() {
        let from = Address::repeat_byte(0x01);
        let to = Address::repeat_byte(0x02);
        let topics = vec![Transfer::SIGNATURE_HASH, from.into_word(), to.into_word()];
        let data = U256::from(42u64).to_be_bytes::<32>();

        assert!(is_transfer_log(&topics, &data));
        let transfer = decode_transfer_event(&topics, &data).unwrap();
        assert_eq!(transfer.from, from);
        assert_eq!(transfer.to, to);
        assert_eq!(transfer.value, U256::from(42u64));
    }

    #[test]
    fn extracts_constructor_input_from_deployer_calls() {
        let call = createCall {
            _salt: B256::ZERO,
            _bytecodeHash: B256::repeat_byte(0x11),
            _input: Bytes::from(vec![0u8, 0, 0, 7]),
        };
        let calldata = call.abi_encode();
        assert_eq!(constructor_input(&calldata), Bytes::from(vec![0u8, 0, 0, 7]));
        assert!(constructor_input(&[0xde, 0xad, 0xbe, 0xef]).is_empty());
    }

    #[test]
    fn recognises_deployment_logs() {
        let deployed = Address::repeat_byte(0x5c);
        let topics = vec![
            ContractDeployed::SIGNATURE_HASH,
            Address::repeat_byte(0x01).into_word(),
            B256::repeat_byte(0x22),
            deployed.into_word(),
        ];
        assert_eq!(
            deployed_contract(&CONTRACT_DEPLOYER_ADDRESS, &topics),
            Some(deployed)
        );
        assert_eq!(deployed_contract(&Address::ZERO, &topics), None);
    }

    #[test]
    fn rejects_other_shapes() {
        let topics = vec![
            Transfer::SIGNATURE_HASH,
            B256::ZERO,
            B256::ZERO,
            B256::with_last_byte(7),
        ];
        assert!(!is_transfer_log(&topics, &[]));
        assert!(!is_transfer_log(&topics[..3], &[0u8; 64]));
        assert!(!is_transfer_log(&[B256::ZERO, B256::ZERO, B256::ZERO], &[0u8; 32]));
    }
}
