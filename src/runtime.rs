//! The Fortran I/O runtime interface.
//!
//! Every entry point the lowering stage can call is listed here with its
//! link name and signature. The runtime API is versioned: a statement is
//! lowered against exactly the signatures below, and the set is closed so
//! that entry selection is a total match rather than a string lookup.

use cranelift_codegen::ir::{types, AbiParam, Signature, Type};
use cranelift_codegen::isa::CallConv;

/// Runtime entry points reachable from I/O lowering.
///
/// Names follow the runtime convention `_FortranAio<Key>`, except for
/// `ReportFatalUserError` which lives in the base runtime library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoKey {
    // Statement begin: external data transfers.
    BeginExternalListOutput,
    BeginExternalListInput,
    BeginExternalFormattedOutput,
    BeginExternalFormattedInput,
    BeginUnformattedOutput,
    BeginUnformattedInput,
    // Statement begin: internal data transfers.
    BeginInternalListOutput,
    BeginInternalListInput,
    BeginInternalFormattedOutput,
    BeginInternalFormattedInput,
    BeginInternalArrayListOutput,
    BeginInternalArrayListInput,
    BeginInternalArrayFormattedOutput,
    BeginInternalArrayFormattedInput,
    // Statement begin: file control.
    BeginOpenUnit,
    BeginOpenNewUnit,
    BeginClose,
    BeginFlush,
    BeginBackspace,
    BeginEndfile,
    BeginRewind,
    BeginWait,
    BeginWaitAll,
    BeginInquireUnit,
    BeginInquireFile,
    BeginInquireIoLength,
    // Condition handling.
    EnableHandlers,
    CheckUnitNumberInRange64,
    CheckUnitNumberInRange128,
    // Connection and transfer specifiers.
    SetAccess,
    SetAction,
    SetAdvance,
    SetAsynchronous,
    SetBlank,
    SetCarriagecontrol,
    SetConvert,
    SetDecimal,
    SetDelim,
    SetEncoding,
    SetFile,
    SetForm,
    SetPad,
    SetPos,
    SetPosition,
    SetRec,
    SetRecl,
    SetRound,
    SetSign,
    SetStatus,
    // Output items.
    OutputDescriptor,
    OutputDerivedType,
    OutputNamelist,
    OutputInteger8,
    OutputInteger16,
    OutputInteger32,
    OutputInteger64,
    OutputInteger128,
    OutputReal32,
    OutputReal64,
    OutputComplex32,
    OutputComplex64,
    OutputAscii,
    OutputLogical,
    // Input items.
    InputDescriptor,
    InputDerivedType,
    InputNamelist,
    InputInteger,
    InputReal32,
    InputReal64,
    InputComplex32,
    InputComplex64,
    InputAscii,
    InputLogical,
    // Queries.
    GetNewUnit,
    GetSize,
    GetIoLength,
    GetAsynchronousId,
    GetIoMsg,
    InquireCharacter,
    InquireInteger64,
    InquireLogical,
    InquirePendingId,
    // Statement end.
    EndIoStatement,
    // Base runtime.
    ReportFatalUserError,
}

impl IoKey {
    /// Link name of the entry point.
    pub fn entry_name(self) -> &'static str {
        match self {
            IoKey::BeginExternalListOutput => "_FortranAioBeginExternalListOutput",
            IoKey::BeginExternalListInput => "_FortranAioBeginExternalListInput",
            IoKey::BeginExternalFormattedOutput => "_FortranAioBeginExternalFormattedOutput",
            IoKey::BeginExternalFormattedInput => "_FortranAioBeginExternalFormattedInput",
            IoKey::BeginUnformattedOutput => "_FortranAioBeginUnformattedOutput",
            IoKey::BeginUnformattedInput => "_FortranAioBeginUnformattedInput",
            IoKey::BeginInternalListOutput => "_FortranAioBeginInternalListOutput",
            IoKey::BeginInternalListInput => "_FortranAioBeginInternalListInput",
            IoKey::BeginInternalFormattedOutput => "_FortranAioBeginInternalFormattedOutput",
            IoKey::BeginInternalFormattedInput => "_FortranAioBeginInternalFormattedInput",
            IoKey::BeginInternalArrayListOutput => "_FortranAioBeginInternalArrayListOutput",
            IoKey::BeginInternalArrayListInput => "_FortranAioBeginInternalArrayListInput",
            IoKey::BeginInternalArrayFormattedOutput => {
                "_FortranAioBeginInternalArrayFormattedOutput"
            }
            IoKey::BeginInternalArrayFormattedInput => {
                "_FortranAioBeginInternalArrayFormattedInput"
            }
            IoKey::BeginOpenUnit => "_FortranAioBeginOpenUnit",
            IoKey::BeginOpenNewUnit => "_FortranAioBeginOpenNewUnit",
            IoKey::BeginClose => "_FortranAioBeginClose",
            IoKey::BeginFlush => "_FortranAioBeginFlush",
            IoKey::BeginBackspace => "_FortranAioBeginBackspace",
            IoKey::BeginEndfile => "_FortranAioBeginEndfile",
            IoKey::BeginRewind => "_FortranAioBeginRewind",
            IoKey::BeginWait => "_FortranAioBeginWait",
            IoKey::BeginWaitAll => "_FortranAioBeginWaitAll",
            IoKey::BeginInquireUnit => "_FortranAioBeginInquireUnit",
            IoKey::BeginInquireFile => "_FortranAioBeginInquireFile",
            IoKey::BeginInquireIoLength => "_FortranAioBeginInquireIoLength",
            IoKey::EnableHandlers => "_FortranAioEnableHandlers",
            IoKey::CheckUnitNumberInRange64 => "_FortranAioCheckUnitNumberInRange64",
            IoKey::CheckUnitNumberInRange128 => "_FortranAioCheckUnitNumberInRange128",
            IoKey::SetAccess => "_FortranAioSetAccess",
            IoKey::SetAction => "_FortranAioSetAction",
            IoKey::SetAdvance => "_FortranAioSetAdvance",
            IoKey::SetAsynchronous => "_FortranAioSetAsynchronous",
            IoKey::SetBlank => "_FortranAioSetBlank",
            IoKey::SetCarriagecontrol => "_FortranAioSetCarriagecontrol",
            IoKey::SetConvert => "_FortranAioSetConvert",
            IoKey::SetDecimal => "_FortranAioSetDecimal",
            IoKey::SetDelim => "_FortranAioSetDelim",
            IoKey::SetEncoding => "_FortranAioSetEncoding",
            IoKey::SetFile => "_FortranAioSetFile",
            IoKey::SetForm => "_FortranAioSetForm",
            IoKey::SetPad => "_FortranAioSetPad",
            IoKey::SetPos => "_FortranAioSetPos",
            IoKey::SetPosition => "_FortranAioSetPosition",
            IoKey::SetRec => "_FortranAioSetRec",
            IoKey::SetRecl => "_FortranAioSetRecl",
            IoKey::SetRound => "_FortranAioSetRound",
            IoKey::SetSign => "_FortranAioSetSign",
            IoKey::SetStatus => "_FortranAioSetStatus",
            IoKey::OutputDescriptor => "_FortranAioOutputDescriptor",
            IoKey::OutputDerivedType => "_FortranAioOutputDerivedType",
            IoKey::OutputNamelist => "_FortranAioOutputNamelist",
            IoKey::OutputInteger8 => "_FortranAioOutputInteger8",
            IoKey::OutputInteger16 => "_FortranAioOutputInteger16",
            IoKey::OutputInteger32 => "_FortranAioOutputInteger32",
            IoKey::OutputInteger64 => "_FortranAioOutputInteger64",
            IoKey::OutputInteger128 => "_FortranAioOutputInteger128",
            IoKey::OutputReal32 => "_FortranAioOutputReal32",
            IoKey::OutputReal64 => "_FortranAioOutputReal64",
            IoKey::OutputComplex32 => "_FortranAioOutputComplex32",
            IoKey::OutputComplex64 => "_FortranAioOutputComplex64",
            IoKey::OutputAscii => "_FortranAioOutputAscii",
            IoKey::OutputLogical => "_FortranAioOutputLogical",
            IoKey::InputDescriptor => "_FortranAioInputDescriptor",
            IoKey::InputDerivedType => "_FortranAioInputDerivedType",
            IoKey::InputNamelist => "_FortranAioInputNamelist",
            IoKey::InputInteger => "_FortranAioInputInteger",
            IoKey::InputReal32 => "_FortranAioInputReal32",
            IoKey::InputReal64 => "_FortranAioInputReal64",
            IoKey::InputComplex32 => "_FortranAioInputComplex32",
            IoKey::InputComplex64 => "_FortranAioInputComplex64",
            IoKey::InputAscii => "_FortranAioInputAscii",
            IoKey::InputLogical => "_FortranAioInputLogical",
            IoKey::GetNewUnit => "_FortranAioGetNewUnit",
            IoKey::GetSize => "_FortranAioGetSize",
            IoKey::GetIoLength => "_FortranAioGetIoLength",
            IoKey::GetAsynchronousId => "_FortranAioGetAsynchronousId",
            IoKey::GetIoMsg => "_FortranAioGetIoMsg",
            IoKey::InquireCharacter => "_FortranAioInquireCharacter",
            IoKey::InquireInteger64 => "_FortranAioInquireInteger64",
            IoKey::InquireLogical => "_FortranAioInquireLogical",
            IoKey::InquirePendingId => "_FortranAioInquirePendingId",
            IoKey::EndIoStatement => "_FortranAioEndIoStatement",
            IoKey::ReportFatalUserError => "_FortranAReportFatalUserError",
        }
    }

    /// Signature of the entry point. `ptr` is the target pointer type; a
    /// cookie, a descriptor, and a character address are all `ptr`.
    pub fn signature(self, ptr: Type, cc: CallConv) -> Signature {
        use types::{F32, F64, I128, I16, I32, I64, I8};
        let (params, ret): (Vec<Type>, Option<Type>) = match self {
            // unit, sourceFile, sourceLine -> cookie
            IoKey::BeginExternalListOutput
            | IoKey::BeginExternalListInput
            | IoKey::BeginUnformattedOutput
            | IoKey::BeginUnformattedInput
            | IoKey::BeginOpenUnit
            | IoKey::BeginClose
            | IoKey::BeginFlush
            | IoKey::BeginBackspace
            | IoKey::BeginEndfile
            | IoKey::BeginRewind
            | IoKey::BeginWaitAll
            | IoKey::BeginInquireUnit => (vec![I32, ptr, I32], Some(ptr)),
            // format, formatLen, formatDesc, unit, sourceFile, sourceLine
            IoKey::BeginExternalFormattedOutput | IoKey::BeginExternalFormattedInput => {
                (vec![ptr, I64, ptr, I32, ptr, I32], Some(ptr))
            }
            // internal, internalLen, scratch, scratchLen, sourceFile, sourceLine
            IoKey::BeginInternalListOutput | IoKey::BeginInternalListInput => {
                (vec![ptr, I64, ptr, I64, ptr, I32], Some(ptr))
            }
            // internal, internalLen, format, formatLen, formatDesc, scratch,
            // scratchLen, sourceFile, sourceLine
            IoKey::BeginInternalFormattedOutput | IoKey::BeginInternalFormattedInput => {
                (vec![ptr, I64, ptr, I64, ptr, ptr, I64, ptr, I32], Some(ptr))
            }
            // descriptor, scratch, scratchLen, sourceFile, sourceLine
            IoKey::BeginInternalArrayListOutput | IoKey::BeginInternalArrayListInput => {
                (vec![ptr, ptr, I64, ptr, I32], Some(ptr))
            }
            // descriptor, format, formatLen, formatDesc, scratch, scratchLen,
            // sourceFile, sourceLine
            IoKey::BeginInternalArrayFormattedOutput
            | IoKey::BeginInternalArrayFormattedInput => {
                (vec![ptr, ptr, I64, ptr, ptr, I64, ptr, I32], Some(ptr))
            }
            IoKey::BeginOpenNewUnit | IoKey::BeginInquireIoLength => {
                (vec![ptr, I32], Some(ptr))
            }
            // unit, id, sourceFile, sourceLine
            IoKey::BeginWait => (vec![I32, I32, ptr, I32], Some(ptr)),
            // file, fileLen, sourceFile, sourceLine
            IoKey::BeginInquireFile => (vec![ptr, I64, ptr, I32], Some(ptr)),
            // cookie, hasIoStat, hasErr, hasEnd, hasEor, hasIoMsg
            IoKey::EnableHandlers => (vec![ptr, I8, I8, I8, I8, I8], None),
            // unit, handleError, ioMsg, ioMsgLen, sourceFile, sourceLine -> iostat
            IoKey::CheckUnitNumberInRange64 => (vec![I64, I8, ptr, I64, ptr, I32], Some(I32)),
            IoKey::CheckUnitNumberInRange128 => (vec![I128, I8, ptr, I64, ptr, I32], Some(I32)),
            // cookie, value, valueLen -> success
            IoKey::SetAccess
            | IoKey::SetAction
            | IoKey::SetAdvance
            | IoKey::SetAsynchronous
            | IoKey::SetBlank
            | IoKey::SetCarriagecontrol
            | IoKey::SetConvert
            | IoKey::SetDecimal
            | IoKey::SetDelim
            | IoKey::SetEncoding
            | IoKey::SetFile
            | IoKey::SetForm
            | IoKey::SetPad
            | IoKey::SetPosition
            | IoKey::SetRound
            | IoKey::SetSign
            | IoKey::SetStatus => (vec![ptr, ptr, I64], Some(I8)),
            // cookie, value -> success
            IoKey::SetPos | IoKey::SetRec | IoKey::SetRecl => (vec![ptr, I64], Some(I8)),
            IoKey::OutputDescriptor | IoKey::OutputNamelist => (vec![ptr, ptr], Some(I8)),
            // cookie, descriptor, nonTbpDefinedIoTable -> success
            IoKey::OutputDerivedType => (vec![ptr, ptr, ptr], Some(I8)),
            IoKey::OutputInteger8 => (vec![ptr, I8], Some(I8)),
            IoKey::OutputInteger16 => (vec![ptr, I16], Some(I8)),
            IoKey::OutputInteger32 => (vec![ptr, I32], Some(I8)),
            IoKey::OutputInteger64 => (vec![ptr, I64], Some(I8)),
            IoKey::OutputInteger128 => (vec![ptr, I128], Some(I8)),
            IoKey::OutputReal32 => (vec![ptr, F32], Some(I8)),
            IoKey::OutputReal64 => (vec![ptr, F64], Some(I8)),
            IoKey::OutputComplex32 => (vec![ptr, F32, F32], Some(I8)),
            IoKey::OutputComplex64 => (vec![ptr, F64, F64], Some(I8)),
            // cookie, buffer, length -> success
            IoKey::OutputAscii => (vec![ptr, ptr, I64], Some(I8)),
            IoKey::OutputLogical => (vec![ptr, I8], Some(I8)),
            IoKey::InputDescriptor | IoKey::InputNamelist => (vec![ptr, ptr], Some(I8)),
            IoKey::InputDerivedType => (vec![ptr, ptr, ptr], Some(I8)),
            // cookie, address, kind -> success
            IoKey::InputInteger => (vec![ptr, ptr, I32], Some(I8)),
            IoKey::InputReal32
            | IoKey::InputReal64
            | IoKey::InputComplex32
            | IoKey::InputComplex64
            | IoKey::InputLogical => (vec![ptr, ptr], Some(I8)),
            IoKey::InputAscii => (vec![ptr, ptr, I64], Some(I8)),
            // cookie, address, kind -> success
            IoKey::GetNewUnit => (vec![ptr, ptr, I32], Some(I8)),
            IoKey::GetSize | IoKey::GetIoLength => (vec![ptr], Some(I64)),
            IoKey::GetAsynchronousId => (vec![ptr], Some(I32)),
            // cookie, buffer, length
            IoKey::GetIoMsg => (vec![ptr, ptr, I64], None),
            // cookie, inquiry, buffer, length -> success
            IoKey::InquireCharacter => (vec![ptr, I32, ptr, I64], Some(I8)),
            // cookie, inquiry, address, kind -> success
            IoKey::InquireInteger64 => (vec![ptr, I32, ptr, I32], Some(I8)),
            // cookie, inquiry, address -> success
            IoKey::InquireLogical => (vec![ptr, I32, ptr], Some(I8)),
            // cookie, id, address -> success
            IoKey::InquirePendingId => (vec![ptr, I32, ptr], Some(I8)),
            IoKey::EndIoStatement => (vec![ptr], Some(I32)),
            // message, sourceFile, sourceLine; does not return
            IoKey::ReportFatalUserError => (vec![ptr, ptr, I32], None),
        };
        let mut sig = Signature::new(cc);
        sig.params = params.into_iter().map(AbiParam::new).collect();
        if let Some(r) = ret {
            sig.returns.push(AbiParam::new(r));
        }
        sig
    }
}

/// Unit number used when a READ names no unit.
pub const DEFAULT_INPUT_UNIT: i64 = 5;
/// Unit number used when a WRITE or PRINT names no unit.
pub const DEFAULT_OUTPUT_UNIT: i64 = 6;

/// Hash of an INQUIRE keyword, matching the runtime's perfect-hash scheme.
/// The keyword must be uppercase alphabetic.
pub fn inquiry_keyword_hash(keyword: &str) -> i32 {
    let mut hash: i64 = 1;
    for b in keyword.bytes() {
        let d = i64::from(b.to_ascii_uppercase() - b'A');
        hash = (26 * hash + d) % 0x00ff_fffd;
    }
    hash as i32
}
