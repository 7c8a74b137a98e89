//! Statement orchestrators: one entry per Fortran I/O statement kind,
//! each producing the bracketed Begin..EndIoStatement call sequence.

use cranelift_codegen::ir::{self, types, InstBuilder};
use cranelift_frontend::FunctionBuilder;
use log::debug;

use crate::ast::{
    CloseSpec, CloseStmt, ConnectCharOpt, ConnectSpec, Direction, FormatSpec, InquireSpec,
    InquireStmt, IoControlSpec, IoStmt, IoUnit, OpenStmt, PositionSpec, PositionStmt,
    TransferCharOpt, TransferStmt, TypedExpr, WaitSpec, WaitStmt,
};
use crate::bridge::Converter;
use crate::errors::{LowerError, Result};
use crate::runtime::{
    inquiry_keyword_hash, IoKey, DEFAULT_INPUT_UNIT, DEFAULT_OUTPUT_UNIT,
};

use super::format::InternalBuffer;
use super::{cast_int, ChainState, CondSpec, ConditionSpecInfo, GuardStack, IoLowerer};

fn cond_of_position(s: &PositionSpec) -> CondSpec<'_> {
    match s {
        PositionSpec::IoStat(e) => CondSpec::IoStat(e),
        PositionSpec::IoMsg(e) => CondSpec::IoMsg(e),
        PositionSpec::Err(_) => CondSpec::Err,
    }
}

fn cond_of_close(s: &CloseSpec) -> CondSpec<'_> {
    match s {
        CloseSpec::IoStat(e) => CondSpec::IoStat(e),
        CloseSpec::IoMsg(e) => CondSpec::IoMsg(e),
        CloseSpec::Err(_) => CondSpec::Err,
        CloseSpec::Status(_) => CondSpec::Other,
    }
}

fn cond_of_connect(s: &ConnectSpec) -> CondSpec<'_> {
    match s {
        ConnectSpec::IoStat(e) => CondSpec::IoStat(e),
        ConnectSpec::IoMsg(e) => CondSpec::IoMsg(e),
        ConnectSpec::Err(_) => CondSpec::Err,
        _ => CondSpec::Other,
    }
}

fn cond_of_wait(s: &WaitSpec) -> CondSpec<'_> {
    match s {
        WaitSpec::IoStat(e) => CondSpec::IoStat(e),
        WaitSpec::IoMsg(e) => CondSpec::IoMsg(e),
        WaitSpec::Err(_) => CondSpec::Err,
        WaitSpec::End(_) => CondSpec::End,
        WaitSpec::Eor(_) => CondSpec::Eor,
        WaitSpec::Id(_) => CondSpec::Other,
    }
}

fn cond_of_control(s: &IoControlSpec) -> CondSpec<'_> {
    match s {
        IoControlSpec::IoStat(e) => CondSpec::IoStat(e),
        IoControlSpec::IoMsg(e) => CondSpec::IoMsg(e),
        IoControlSpec::Err(_) => CondSpec::Err,
        IoControlSpec::End(_) => CondSpec::End,
        IoControlSpec::Eor(_) => CondSpec::Eor,
        _ => CondSpec::Other,
    }
}

fn cond_of_inquire(s: &InquireSpec) -> CondSpec<'_> {
    use crate::ast::{InquireCharKind, InquireIntKind};
    match s {
        InquireSpec::IntVar(InquireIntKind::Iostat, e) => CondSpec::IoStat(e),
        InquireSpec::CharVar(InquireCharKind::Iomsg, e) => CondSpec::IoMsg(e),
        InquireSpec::Err(_) => CondSpec::Err,
        _ => CondSpec::Other,
    }
}

fn connect_char_key(opt: ConnectCharOpt) -> Result<IoKey> {
    Ok(match opt {
        ConnectCharOpt::Access => IoKey::SetAccess,
        ConnectCharOpt::Action => IoKey::SetAction,
        ConnectCharOpt::Asynchronous => IoKey::SetAsynchronous,
        ConnectCharOpt::Blank => IoKey::SetBlank,
        ConnectCharOpt::Carriagecontrol => IoKey::SetCarriagecontrol,
        ConnectCharOpt::Convert => IoKey::SetConvert,
        ConnectCharOpt::Decimal => IoKey::SetDecimal,
        ConnectCharOpt::Delim => IoKey::SetDelim,
        ConnectCharOpt::Encoding => IoKey::SetEncoding,
        ConnectCharOpt::Form => IoKey::SetForm,
        ConnectCharOpt::Pad => IoKey::SetPad,
        ConnectCharOpt::Position => IoKey::SetPosition,
        ConnectCharOpt::Round => IoKey::SetRound,
        ConnectCharOpt::Sign => IoKey::SetSign,
        ConnectCharOpt::Dispose => {
            return Err(LowerError::unsupported("DISPOSE= specifier"))
        }
    })
}

fn transfer_char_key(opt: TransferCharOpt) -> IoKey {
    match opt {
        TransferCharOpt::Advance => IoKey::SetAdvance,
        TransferCharOpt::Asynchronous => IoKey::SetAsynchronous,
        TransferCharOpt::Blank => IoKey::SetBlank,
        TransferCharOpt::Decimal => IoKey::SetDecimal,
        TransferCharOpt::Delim => IoKey::SetDelim,
        TransferCharOpt::Pad => IoKey::SetPad,
        TransferCharOpt::Round => IoKey::SetRound,
        TransferCharOpt::Sign => IoKey::SetSign,
    }
}

/// Begin entry for a data transfer, by axis: formatted or namelist,
/// list-directed or namelist, internal, and internal-with-descriptor.
fn begin_transfer_key(
    dir: Direction,
    formatted_or_nml: bool,
    list_or_nml: bool,
    internal: bool,
    with_desc: bool,
) -> IoKey {
    let input = dir == Direction::Input;
    if !formatted_or_nml {
        return if input {
            IoKey::BeginUnformattedInput
        } else {
            IoKey::BeginUnformattedOutput
        };
    }
    match (internal, with_desc, list_or_nml, input) {
        (true, true, true, true) => IoKey::BeginInternalArrayListInput,
        (true, true, true, false) => IoKey::BeginInternalArrayListOutput,
        (true, true, false, true) => IoKey::BeginInternalArrayFormattedInput,
        (true, true, false, false) => IoKey::BeginInternalArrayFormattedOutput,
        (true, false, true, true) => IoKey::BeginInternalListInput,
        (true, false, true, false) => IoKey::BeginInternalListOutput,
        (true, false, false, true) => IoKey::BeginInternalFormattedInput,
        (true, false, false, false) => IoKey::BeginInternalFormattedOutput,
        (false, _, true, true) => IoKey::BeginExternalListInput,
        (false, _, true, false) => IoKey::BeginExternalListOutput,
        (false, _, false, true) => IoKey::BeginExternalFormattedInput,
        (false, _, false, false) => IoKey::BeginExternalFormattedOutput,
    }
}

impl<C: Converter> IoLowerer<'_, C> {
    /// Lower one I/O statement. Returns the final iostat value when the
    /// statement carries ERR=, END=, EOR=, or IOSTAT=, so the caller can
    /// branch to the labeled targets.
    pub fn lower_stmt(
        &mut self,
        b: &mut FunctionBuilder,
        stmt: &IoStmt,
    ) -> Result<Option<ir::Value>> {
        match stmt {
            IoStmt::Backspace(s) => self.lower_position(b, IoKey::BeginBackspace, s),
            IoStmt::Endfile(s) => self.lower_position(b, IoKey::BeginEndfile, s),
            IoStmt::Rewind(s) => self.lower_position(b, IoKey::BeginRewind, s),
            IoStmt::Flush(s) => self.lower_position(b, IoKey::BeginFlush, s),
            IoStmt::Close(s) => self.lower_close(b, s),
            IoStmt::Open(s) => self.lower_open(b, s),
            IoStmt::Wait(s) => self.lower_wait(b, s),
            IoStmt::Read(s) => self.lower_transfer(b, Direction::Input, s),
            IoStmt::Write(s) | IoStmt::Print(s) => {
                self.lower_transfer(b, Direction::Output, s)
            }
            IoStmt::Inquire(s) => self.lower_inquire(b, s),
        }
    }

    /// BACKSPACE, ENDFILE, REWIND, FLUSH: unit-only statements whose only
    /// specifiers are condition handlers.
    fn lower_position(
        &mut self,
        b: &mut FunctionBuilder,
        key: IoKey,
        s: &PositionStmt,
    ) -> Result<Option<ir::Value>> {
        debug!("lowering {}", key.entry_name());
        let mut csi = ConditionSpecInfo::scan(s.specs.iter().map(cond_of_position));
        let unit = self.unit_number(b, &s.unit, types::I32, &mut csi)?;
        let (file, line) = self.location_args(b)?;
        let cookie = self.call_io(b, key, &[unit, file, line])?;
        self.enable_handlers(b, cookie, &mut csi)?;
        self.end_io(b, cookie, &mut csi)
    }

    fn lower_close(
        &mut self,
        b: &mut FunctionBuilder,
        s: &CloseStmt,
    ) -> Result<Option<ir::Value>> {
        debug!("lowering CLOSE");
        let mut csi = ConditionSpecInfo::scan(s.specs.iter().map(cond_of_close));
        let unit = self.unit_number(b, &s.unit, types::I32, &mut csi)?;
        let (file, line) = self.location_args(b)?;
        let cookie = self.call_io(b, IoKey::BeginClose, &[unit, file, line])?;
        self.enable_handlers(b, cookie, &mut csi)?;
        let check = csi.has_error_spec();
        let mut chain = ChainState::Unchecked;
        let mut guards = GuardStack::new();
        for spec in &s.specs {
            if let CloseSpec::Status(e) = spec {
                self.set_char_spec(
                    b,
                    cookie,
                    IoKey::SetStatus,
                    e,
                    check,
                    &mut chain,
                    &mut guards,
                )?;
            }
        }
        guards.close_all(b, &mut chain);
        self.end_io(b, cookie, &mut csi)
    }

    fn lower_open(
        &mut self,
        b: &mut FunctionBuilder,
        s: &OpenStmt,
    ) -> Result<Option<ir::Value>> {
        debug!("lowering OPEN");
        let mut csi = ConditionSpecInfo::scan(s.specs.iter().map(cond_of_connect));
        let unit_expr = s.specs.iter().find_map(|sp| match sp {
            ConnectSpec::Unit(e) => Some(e),
            _ => None,
        });
        let newunit = s.specs.iter().find_map(|sp| match sp {
            ConnectSpec::NewUnit(e) => Some(e),
            _ => None,
        });
        let cookie = if let Some(u) = unit_expr {
            let unit = self.unit_number(b, u, types::I32, &mut csi)?;
            let (file, line) = self.location_args(b)?;
            self.call_io(b, IoKey::BeginOpenUnit, &[unit, file, line])?
        } else if newunit.is_some() {
            let (file, line) = self.location_args(b)?;
            self.call_io(b, IoKey::BeginOpenNewUnit, &[file, line])?
        } else {
            return Err(LowerError::fatal("OPEN requires UNIT= or NEWUNIT="));
        };
        self.enable_handlers(b, cookie, &mut csi)?;
        let check = csi.has_error_spec();
        let mut chain = ChainState::Unchecked;
        let mut guards = GuardStack::new();
        for spec in &s.specs {
            match spec {
                ConnectSpec::File(e) => self.set_char_spec(
                    b,
                    cookie,
                    IoKey::SetFile,
                    e,
                    check,
                    &mut chain,
                    &mut guards,
                )?,
                ConnectSpec::Status(e) => self.set_char_spec(
                    b,
                    cookie,
                    IoKey::SetStatus,
                    e,
                    check,
                    &mut chain,
                    &mut guards,
                )?,
                ConnectSpec::CharOpt(opt, e) => {
                    let key = connect_char_key(*opt)?;
                    self.set_char_spec(b, cookie, key, e, check, &mut chain, &mut guards)?
                }
                ConnectSpec::Recl(e) => self.set_int_spec(
                    b,
                    cookie,
                    IoKey::SetRecl,
                    e,
                    check,
                    &mut chain,
                    &mut guards,
                )?,
                ConnectSpec::Unit(_)
                | ConnectSpec::NewUnit(_)
                | ConnectSpec::Err(_)
                | ConnectSpec::IoStat(_)
                | ConnectSpec::IoMsg(_) => {}
            }
        }
        // NEWUNIT= is queried last, inside the active guard region, so a
        // failed specifier leaves the variable alone.
        if let Some(v) = newunit {
            let addr = self.conv.expr_address(b, v)?;
            let bytes = i64::from(v.ty.kind_bytes().unwrap_or(4));
            let kind = b.ins().iconst(types::I32, bytes);
            let ok = self.call_io(b, IoKey::GetNewUnit, &[cookie, addr, kind])?;
            if check {
                chain.update(ok);
            }
        }
        guards.close_all(b, &mut chain);
        self.end_io(b, cookie, &mut csi)
    }

    fn lower_wait(
        &mut self,
        b: &mut FunctionBuilder,
        s: &WaitStmt,
    ) -> Result<Option<ir::Value>> {
        debug!("lowering WAIT");
        let mut csi = ConditionSpecInfo::scan(s.specs.iter().map(cond_of_wait));
        let id = s.specs.iter().find_map(|sp| match sp {
            WaitSpec::Id(e) => Some(e),
            _ => None,
        });
        let unit = self.unit_number(b, &s.unit, types::I32, &mut csi)?;
        let cookie = if let Some(id_expr) = id {
            let id_val = self.conv.expr_value(b, id_expr)?;
            let id_val = cast_int(b, id_val, types::I32);
            let (file, line) = self.location_args(b)?;
            self.call_io(b, IoKey::BeginWait, &[unit, id_val, file, line])?
        } else {
            let (file, line) = self.location_args(b)?;
            self.call_io(b, IoKey::BeginWaitAll, &[unit, file, line])?
        };
        self.enable_handlers(b, cookie, &mut csi)?;
        self.end_io(b, cookie, &mut csi)
    }

    /// READ, WRITE, PRINT.
    fn lower_transfer(
        &mut self,
        b: &mut FunctionBuilder,
        dir: Direction,
        s: &TransferStmt,
    ) -> Result<Option<ir::Value>> {
        debug!("lowering data transfer");
        let mut csi = ConditionSpecInfo::scan(s.controls.iter().map(cond_of_control));
        let is_formatted = s.format.is_some();
        let is_list = matches!(s.format, Some(FormatSpec::ListDirected));
        let is_nml = s.namelist.is_some();
        let explicit_fmt = is_formatted && !is_list;
        let internal = matches!(s.unit, Some(IoUnit::Internal(_)));
        if internal && !is_formatted && !is_nml {
            return Err(LowerError::fatal("unformatted transfer on internal unit"));
        }

        let mut args: Vec<ir::Value> = Vec::new();
        let mut with_desc = false;
        match &s.unit {
            Some(IoUnit::Internal(var)) => {
                match self.internal_buffer(b, var)? {
                    InternalBuffer::Chars { addr, len } => {
                        args.push(addr);
                        args.push(len);
                    }
                    InternalBuffer::Desc(d) => {
                        with_desc = true;
                        args.push(d);
                    }
                }
                if explicit_fmt {
                    if let Some(spec) = &s.format {
                        let fmt = self.format_ops(b, spec)?;
                        args.extend([fmt.text, fmt.len, fmt.desc]);
                    }
                }
                // No scratch area is passed; the runtime allocates its own.
                let scratch = self.null_ptr(b);
                let scratch_len = b.ins().iconst(types::I64, 0);
                args.push(scratch);
                args.push(scratch_len);
            }
            Some(IoUnit::External(e)) => {
                if explicit_fmt {
                    if let Some(spec) = &s.format {
                        let fmt = self.format_ops(b, spec)?;
                        args.extend([fmt.text, fmt.len, fmt.desc]);
                    }
                }
                let unit = self.unit_number(b, e, types::I32, &mut csi)?;
                args.push(unit);
            }
            None => {
                if explicit_fmt {
                    if let Some(spec) = &s.format {
                        let fmt = self.format_ops(b, spec)?;
                        args.extend([fmt.text, fmt.len, fmt.desc]);
                    }
                }
                let unit = match dir {
                    Direction::Input => DEFAULT_INPUT_UNIT,
                    Direction::Output => DEFAULT_OUTPUT_UNIT,
                };
                args.push(b.ins().iconst(types::I32, unit));
            }
        }
        let (file, line) = self.location_args(b)?;
        args.push(file);
        args.push(line);

        let key = begin_transfer_key(
            dir,
            is_formatted || is_nml,
            is_list || is_nml,
            internal,
            with_desc,
        );
        let cookie = self.call_io(b, key, &args)?;
        self.enable_handlers(b, cookie, &mut csi)?;

        let check_specs = csi.has_error_spec();
        let mut chain = ChainState::Unchecked;
        let mut guards = GuardStack::new();
        for spec in &s.controls {
            match spec {
                IoControlSpec::CharOpt(opt, e) => {
                    let key = transfer_char_key(*opt);
                    self.set_char_spec(
                        b,
                        cookie,
                        key,
                        e,
                        check_specs,
                        &mut chain,
                        &mut guards,
                    )?
                }
                IoControlSpec::Pos(e) => self.set_int_spec(
                    b,
                    cookie,
                    IoKey::SetPos,
                    e,
                    check_specs,
                    &mut chain,
                    &mut guards,
                )?,
                IoControlSpec::Rec(e) => self.set_int_spec(
                    b,
                    cookie,
                    IoKey::SetRec,
                    e,
                    check_specs,
                    &mut chain,
                    &mut guards,
                )?,
                // SIZE= and ID= are queries, handled after the transfer.
                _ => {}
            }
        }

        let check_items = csi.has_transfer_spec();
        if let Some(group) = &s.namelist {
            guards.open(b, check_items, &chain);
            let group_addr = self.namelist_group_addr(b, group)?;
            let key = match dir {
                Direction::Input => IoKey::InputNamelist,
                Direction::Output => IoKey::OutputNamelist,
            };
            let ok = self.call_io(b, key, &[cookie, group_addr])?;
            if check_items {
                chain.update(ok);
            }
        } else {
            self.transfer_items(
                b,
                cookie,
                &s.items,
                dir,
                is_formatted,
                check_items,
                &mut chain,
                &mut guards,
            )?;
        }
        guards.close_all(b, &mut chain);

        // SIZE= and ID= are meaningful even after a failed transfer, so
        // they are queried outside the guard chain.
        for spec in &s.controls {
            match spec {
                IoControlSpec::Size(v) => {
                    let n = self.call_io(b, IoKey::GetSize, &[cookie])?;
                    self.store_int_result(b, v, n)?;
                }
                IoControlSpec::Id(v) => {
                    let id = self.call_io(b, IoKey::GetAsynchronousId, &[cookie])?;
                    self.store_int_result(b, v, id)?;
                }
                _ => {}
            }
        }
        self.end_io(b, cookie, &mut csi)
    }

    fn lower_inquire(
        &mut self,
        b: &mut FunctionBuilder,
        s: &InquireStmt,
    ) -> Result<Option<ir::Value>> {
        debug!("lowering INQUIRE");
        match s {
            InquireStmt::Specs(specs) => self.lower_inquire_specs(b, specs),
            InquireStmt::IoLength { var, items } => self.lower_inquire_iolength(b, var, items),
        }
    }

    fn lower_inquire_specs(
        &mut self,
        b: &mut FunctionBuilder,
        specs: &[InquireSpec],
    ) -> Result<Option<ir::Value>> {
        use crate::ast::InquireLogKind;
        let mut csi = ConditionSpecInfo::scan(specs.iter().map(cond_of_inquire));
        let unit_expr = specs.iter().find_map(|sp| match sp {
            InquireSpec::Unit(e) => Some(e),
            _ => None,
        });
        let file_expr = specs.iter().find_map(|sp| match sp {
            InquireSpec::File(e) => Some(e),
            _ => None,
        });
        let cookie = if let Some(u) = unit_expr {
            let unit = self.unit_number(b, u, types::I32, &mut csi)?;
            let (file, line) = self.location_args(b)?;
            self.call_io(b, IoKey::BeginInquireUnit, &[unit, file, line])?
        } else if let Some(f) = file_expr {
            let (addr, len) = self.conv.char_addr_len(b, f)?;
            let len = cast_int(b, len, types::I64);
            let (file, line) = self.location_args(b)?;
            self.call_io(b, IoKey::BeginInquireFile, &[addr, len, file, line])?
        } else {
            return Err(LowerError::fatal("INQUIRE requires UNIT= or FILE="));
        };
        self.enable_handlers(b, cookie, &mut csi)?;
        // ID= feeds PENDING= and is evaluated once, ahead of the queries.
        let id_val = match specs.iter().find_map(|sp| match sp {
            InquireSpec::Id(e) => Some(e),
            _ => None,
        }) {
            Some(e) => {
                let v = self.conv.expr_value(b, e)?;
                Some(cast_int(b, v, types::I32))
            }
            None => None,
        };
        let check = csi.has_error_spec();
        let mut chain = ChainState::Unchecked;
        let mut guards = GuardStack::new();
        for spec in specs {
            if matches!(cond_of_inquire(spec), CondSpec::IoStat(_) | CondSpec::IoMsg(_)) {
                continue;
            }
            match spec {
                InquireSpec::CharVar(kind, var) => {
                    guards.open(b, check, &chain);
                    let hash =
                        b.ins()
                            .iconst(types::I32, i64::from(inquiry_keyword_hash(kind.keyword())));
                    let (addr, len) = self.conv.char_addr_len(b, var)?;
                    let len = cast_int(b, len, types::I64);
                    let ok = self.call_io(
                        b,
                        IoKey::InquireCharacter,
                        &[cookie, hash, addr, len],
                    )?;
                    if check {
                        chain.update(ok);
                    }
                }
                InquireSpec::IntVar(kind, var) => {
                    guards.open(b, check, &chain);
                    let hash =
                        b.ins()
                            .iconst(types::I32, i64::from(inquiry_keyword_hash(kind.keyword())));
                    let addr = self.conv.expr_address(b, var)?;
                    let bytes = i64::from(var.ty.kind_bytes().unwrap_or(4));
                    let k = b.ins().iconst(types::I32, bytes);
                    let ok = self.call_io(
                        b,
                        IoKey::InquireInteger64,
                        &[cookie, hash, addr, k],
                    )?;
                    if check {
                        chain.update(ok);
                    }
                }
                InquireSpec::LogVar(kind, var) => {
                    guards.open(b, check, &chain);
                    let addr = self.conv.expr_address(b, var)?;
                    let ok = match (kind, id_val) {
                        (InquireLogKind::Pending, Some(id)) => {
                            self.call_io(b, IoKey::InquirePendingId, &[cookie, id, addr])?
                        }
                        _ => {
                            let hash = b.ins().iconst(
                                types::I32,
                                i64::from(inquiry_keyword_hash(kind.keyword())),
                            );
                            self.call_io(b, IoKey::InquireLogical, &[cookie, hash, addr])?
                        }
                    };
                    let bits = var.ty.kind_bytes().unwrap_or(4) * 8;
                    super::widen_stored_bool(b, addr, bits);
                    if check {
                        chain.update(ok);
                    }
                }
                InquireSpec::Unit(_)
                | InquireSpec::File(_)
                | InquireSpec::Id(_)
                | InquireSpec::Err(_) => {}
            }
        }
        guards.close_all(b, &mut chain);
        self.end_io(b, cookie, &mut csi)
    }

    /// INQUIRE(IOLENGTH=n) output-items: run the items through an
    /// unformatted length-counting statement, then store the byte count.
    fn lower_inquire_iolength(
        &mut self,
        b: &mut FunctionBuilder,
        var: &TypedExpr,
        items: &[crate::ast::IoItem],
    ) -> Result<Option<ir::Value>> {
        let mut csi = ConditionSpecInfo::default();
        let (file, line) = self.location_args(b)?;
        let cookie = self.call_io(b, IoKey::BeginInquireIoLength, &[file, line])?;
        let mut chain = ChainState::Unchecked;
        let mut guards = GuardStack::new();
        self.transfer_items(
            b,
            cookie,
            items,
            Direction::Output,
            false,
            false,
            &mut chain,
            &mut guards,
        )?;
        let n = self.call_io(b, IoKey::GetIoLength, &[cookie])?;
        self.store_int_result(b, var, n)?;
        self.end_io(b, cookie, &mut csi)
    }

    /// Thread one character-valued specifier setter onto the chain.
    #[allow(clippy::too_many_arguments)]
    fn set_char_spec(
        &mut self,
        b: &mut FunctionBuilder,
        cookie: ir::Value,
        key: IoKey,
        e: &TypedExpr,
        check: bool,
        chain: &mut ChainState,
        guards: &mut GuardStack,
    ) -> Result<()> {
        guards.open(b, check, chain);
        let (addr, len) = self.conv.char_addr_len(b, e)?;
        let len = cast_int(b, len, types::I64);
        let ok = self.call_io(b, key, &[cookie, addr, len])?;
        if check {
            chain.update(ok);
        }
        Ok(())
    }

    /// Thread one integer-valued specifier setter onto the chain.
    #[allow(clippy::too_many_arguments)]
    fn set_int_spec(
        &mut self,
        b: &mut FunctionBuilder,
        cookie: ir::Value,
        key: IoKey,
        e: &TypedExpr,
        check: bool,
        chain: &mut ChainState,
        guards: &mut GuardStack,
    ) -> Result<()> {
        guards.open(b, check, chain);
        let v = self.conv.expr_value(b, e)?;
        let v = cast_int(b, v, types::I64);
        let ok = self.call_io(b, key, &[cookie, v])?;
        if check {
            chain.update(ok);
        }
        Ok(())
    }
}
