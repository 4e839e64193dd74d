//! Contract interfaces (ABI): methods, parameters and events.
//!
//! Serialized through the crate codec; decoding re-validates, so a stored
//! interface is always well formed.

use crate::types::encoding::{Decode, Encode};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::object::VMType;
use ledger_vm_derive::BinaryCodec;
use std::collections::HashSet;

/// Offset recorded for methods that have no script body.
pub const NATIVE_METHOD_OFFSET: i32 = -1;

#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct ContractParameter {
    pub name: String,
    pub ty: VMType,
}

impl ContractParameter {
    pub fn new(name: impl Into<String>, ty: VMType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct ContractMethod {
    pub name: String,
    pub return_type: VMType,
    pub parameters: Vec<ContractParameter>,
    /// Script offset of the method body, [`NATIVE_METHOD_OFFSET`] for native methods.
    pub offset: i32,
}

impl ContractMethod {
    pub fn new(
        name: impl Into<String>,
        return_type: VMType,
        parameters: Vec<ContractParameter>,
        offset: i32,
    ) -> Self {
        Self {
            name: name.into(),
            return_type,
            parameters,
            offset,
        }
    }

    pub fn is_native(&self) -> bool {
        self.offset < 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct ContractEvent {
    pub value: u8,
    pub name: String,
    pub return_type: VMType,
    pub description: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, BinaryCodec)]
pub struct ContractInterface {
    methods: Vec<ContractMethod>,
    events: Vec<ContractEvent>,
}

impl ContractInterface {
    /// Builds a validated interface.
    ///
    /// Method names must be unique ignoring case, script offsets unique,
    /// event names and values unique.
    pub fn new(
        methods: Vec<ContractMethod>,
        events: Vec<ContractEvent>,
    ) -> Result<ContractInterface, VMError> {
        let abi = ContractInterface { methods, events };
        abi.validate()?;
        Ok(abi)
    }

    fn validate(&self) -> Result<(), VMError> {
        let mut names = HashSet::new();
        let mut offsets = HashSet::new();
        for method in &self.methods {
            if method.name.is_empty() {
                return Err(VMError::InvalidAbi("empty method name".into()));
            }
            if !names.insert(method.name.to_ascii_lowercase()) {
                return Err(VMError::InvalidAbi(format!(
                    "duplicate method {}",
                    method.name
                )));
            }
            if !method.is_native() && !offsets.insert(method.offset) {
                return Err(VMError::InvalidAbi(format!(
                    "duplicate offset {} for method {}",
                    method.offset, method.name
                )));
            }
        }

        let mut event_names = HashSet::new();
        let mut event_values = HashSet::new();
        for event in &self.events {
            if !event_names.insert(event.name.as_str()) {
                return Err(VMError::InvalidAbi(format!("duplicate event {}", event.name)));
            }
            if !event_values.insert(event.value) {
                return Err(VMError::InvalidAbi(format!(
                    "duplicate event value {}",
                    event.value
                )));
            }
        }
        Ok(())
    }

    pub fn methods(&self) -> &[ContractMethod] {
        &self.methods
    }

    pub fn events(&self) -> &[ContractEvent] {
        &self.events
    }

    /// Names match ignoring ASCII case, the same rule that keeps them unique.
    pub fn find_method(&self, name: &str) -> Option<&ContractMethod> {
        self.methods.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.find_method(name).is_some()
    }

    pub fn find_event(&self, value: u8) -> Option<&ContractEvent> {
        self.events.iter().find(|e| e.value == value)
    }

    /// Checks that every method of `other` exists here with the same signature.
    pub fn implements(&self, other: &ContractInterface) -> bool {
        other.methods.iter().all(|theirs| {
            self.find_method(&theirs.name).is_some_and(|ours| {
                ours.return_type == theirs.return_type && ours.parameters == theirs.parameters
            })
        })
    }

    /// Checks every script offset lands inside a script of `script_len` bytes.
    pub fn validate_offsets(&self, script_len: usize) -> Result<(), VMError> {
        for method in self.methods.iter().filter(|m| !m.is_native()) {
            if method.offset as usize >= script_len {
                return Err(VMError::InvalidAbi(format!(
                    "method {} offset {} outside script of {} bytes",
                    method.name, method.offset, script_len
                )));
            }
        }
        Ok(())
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.to_bytes()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<ContractInterface, VMError> {
        let abi = ContractInterface::from_bytes(bytes)
            .map_err(|e| VMError::InvalidAbi(e.to_string()))?;
        abi.validate()?;
        Ok(abi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContractInterface {
        ContractInterface::new(
            vec![
                ContractMethod::new(
                    "transfer",
                    VMType::None,
                    vec![
                        ContractParameter::new("from", VMType::Object),
                        ContractParameter::new("amount", VMType::Number),
                    ],
                    0,
                ),
                ContractMethod::new("getName", VMType::String, vec![], 17),
            ],
            vec![ContractEvent {
                value: 1,
                name: "Sent".into(),
                return_type: VMType::Number,
                description: vec![0xAA, 0xBB],
            }],
        )
        .unwrap()
    }

    #[test]
    fn serialization_is_byte_identical() {
        let abi = sample();
        let bytes = abi.serialize();
        let decoded = ContractInterface::deserialize(&bytes).unwrap();
        assert_eq!(decoded, abi);
        assert_eq!(decoded.serialize(), bytes);
    }

    #[test]
    fn method_names_unique_ignoring_case() {
        let err = ContractInterface::new(
            vec![
                ContractMethod::new("Mint", VMType::None, vec![], 0),
                ContractMethod::new("mint", VMType::None, vec![], 4),
            ],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, VMError::InvalidAbi(_)));
    }

    #[test]
    fn method_lookup_ignores_case() {
        let abi = sample();
        assert_eq!(abi.find_method("GETNAME").unwrap().name, "getName");
        assert!(abi.has_method("Transfer"));
        assert!(!abi.has_method("transfe"));
    }

    #[test]
    fn script_offsets_unique_but_native_exempt() {
        assert!(
            ContractInterface::new(
                vec![
                    ContractMethod::new("a", VMType::None, vec![], 3),
                    ContractMethod::new("b", VMType::None, vec![], 3),
                ],
                vec![],
            )
            .is_err()
        );
        assert!(
            ContractInterface::new(
                vec![
                    ContractMethod::new("a", VMType::None, vec![], NATIVE_METHOD_OFFSET),
                    ContractMethod::new("b", VMType::None, vec![], NATIVE_METHOD_OFFSET),
                ],
                vec![],
            )
            .is_ok()
        );
    }

    #[test]
    fn duplicate_event_values_rejected() {
        let event = |name: &str| ContractEvent {
            value: 7,
            name: name.into(),
            return_type: VMType::None,
            description: vec![],
        };
        assert!(ContractInterface::new(vec![], vec![event("A"), event("B")]).is_err());
    }

    #[test]
    fn implements_checks_signatures() {
        let abi = sample();
        let subset = ContractInterface::new(
            vec![ContractMethod::new("getName", VMType::String, vec![], 40)],
            vec![],
        )
        .unwrap();
        assert!(abi.implements(&subset));
        let changed = ContractInterface::new(
            vec![ContractMethod::new("getName", VMType::Number, vec![], 0)],
            vec![],
        )
        .unwrap();
        assert!(!abi.implements(&changed));
    }

    #[test]
    fn offsets_must_fit_script() {
        assert!(sample().validate_offsets(18).is_ok());
        assert!(sample().validate_offsets(17).is_err());
    }

    #[test]
    fn corrupt_bytes_rejected() {
        let mut bytes = sample().serialize();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            ContractInterface::deserialize(&bytes),
            Err(VMError::InvalidAbi(_))
        ));
    }
}
