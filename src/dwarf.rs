// Copyright (c) 2026 Codeobj-Helper Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! DWARF line tables and compilation unit bounds.
//!
//! Nothing in here is fatal past the initial section loading: a unit or row
//! that cannot be decoded is skipped and the tables may come out partially
//! populated or empty.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use gimli::Reader;
use object::{Object, ObjectSection};

use crate::error::IndexError;
use crate::line_table::DebugInfo;

type DwarfReader = gimli::EndianRcSlice<gimli::RunTimeEndian>;

pub fn load_debug_info(data: &[u8], load_address: u64) -> Result<DebugInfo, IndexError> {
    let obj_file = object::File::parse(data)?;
    let endian = if obj_file.is_little_endian() {
        gimli::RunTimeEndian::Little
    } else {
        gimli::RunTimeEndian::Big
    };

    // Load DWARF sections; missing ones are empty.
    let load_section = |id: gimli::SectionId| -> Result<DwarfReader, gimli::Error> {
        let data = obj_file
            .section_by_name(id.name())
            .map(|s| s.uncompressed_data().unwrap_or_default())
            .unwrap_or_default();

        let data_rc: Rc<[u8]> = match data {
            Cow::Borrowed(b) => Rc::from(b),
            Cow::Owned(o) => Rc::from(o),
        };
        Ok(gimli::EndianRcSlice::new(data_rc, endian))
    };
    let dwarf = gimli::Dwarf::load(&load_section)?;

    let mut info = DebugInfo::default();
    let mut units = dwarf.units();
    loop {
        let header = match units.next() {
            Ok(Some(header)) => header,
            Ok(None) => break,
            Err(e) => {
                log::debug!("stopping at undecodable unit header: {}", e);
                break;
            }
        };
        let unit = match dwarf.unit(header) {
            Ok(unit) => unit,
            Err(e) => {
                log::debug!("skipping unit: {}", e);
                continue;
            }
        };

        match unit_pc_bounds(&dwarf, &unit) {
            Ok(Some((low, high))) => info.units.insert(
                load_address.wrapping_add(low),
                load_address.wrapping_add(high),
            ),
            Ok(None) => {}
            Err(e) => log::debug!("no pc bounds for unit: {}", e),
        }

        if let Err(e) = add_line_rows(&dwarf, &unit, load_address, &mut info) {
            log::debug!("line program cut short: {}", e);
        }
    }

    log::debug!(
        "loaded {} line rows, {} unit ranges",
        info.lines.len(),
        info.units.len()
    );
    Ok(info)
}

/// `DW_AT_low_pc`/`DW_AT_high_pc` of the unit's root DIE, when both exist.
fn unit_pc_bounds<R: Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &gimli::Unit<R>,
) -> gimli::Result<Option<(u64, u64)>> {
    let mut entries = unit.entries();
    let Some((_, root)) = entries.next_dfs()? else {
        return Ok(None);
    };

    let low = match root.attr_value(gimli::DW_AT_low_pc)? {
        Some(value) => dwarf.attr_address(unit, value)?,
        None => None,
    };
    let Some(low) = low else {
        return Ok(None);
    };

    // high_pc can be an address OR an offset (length)
    let high = match root.attr_value(gimli::DW_AT_high_pc)? {
        Some(gimli::AttributeValue::Udata(size)) => Some(low.wrapping_add(size)),
        Some(value) => dwarf.attr_address(unit, value)?,
        None => None,
    };
    Ok(high.map(|high| (low, high)))
}

fn add_line_rows<R: Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &gimli::Unit<R>,
    load_address: u64,
    info: &mut DebugInfo,
) -> gimli::Result<()> {
    let Some(program) = unit.line_program.clone() else {
        return Ok(());
    };

    let mut paths: HashMap<u64, Option<String>> = HashMap::new();
    let mut rows = program.rows();
    while let Some((header, row)) = rows.next_row()? {
        if row.end_sequence() || row.address() == 0 {
            continue;
        }
        let Some(line) = row.line() else {
            // Line 0: compiler generated code.
            continue;
        };
        let path = paths
            .entry(row.file_index())
            .or_insert_with(|| file_path(dwarf, unit, header, row));
        if let Some(path) = path {
            info.lines
                .insert(load_address.wrapping_add(row.address()), path, line);
        }
    }
    Ok(())
}

/// Full path of a row's file: the name, under its include directory when
/// relative, under the unit's compilation directory when that is relative too.
fn file_path<R: Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &gimli::Unit<R>,
    header: &gimli::LineProgramHeader<R>,
    row: &gimli::LineRow,
) -> Option<String> {
    let file = row.file(header)?;
    let mut path = PathBuf::new();
    if let Some(comp_dir) = &unit.comp_dir {
        path.push(comp_dir.to_string_lossy().ok()?.as_ref());
    }
    if let Some(directory) = file.directory(header) {
        let directory = dwarf.attr_string(unit, directory).ok()?;
        path.push(directory.to_string_lossy().ok()?.as_ref());
    }
    let name = dwarf.attr_string(unit, file.path_name()).ok()?;
    path.push(name.to_string_lossy().ok()?.as_ref());
    Some(path.to_string_lossy().into_owned())
}
