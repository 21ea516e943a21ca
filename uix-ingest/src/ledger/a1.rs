//! A1 notation helpers

/// 0-based column index to letters (`0` → `A`, `26` → `AA`)
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Sheet name quoted for use in a range (`'Data'`, `'CFO''s'`)
pub fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// Range covering a whole sheet
pub fn sheet_range(sheet: &str) -> String {
    quote_sheet(sheet)
}

/// Rectangular range from 0-based coordinates, `width`×`height` cells
pub fn block_range(sheet: &str, start_row: usize, start_col: usize, width: usize, height: usize) -> String {
    let end_col = start_col + width.max(1) - 1;
    let end_row = start_row + height.max(1) - 1;
    format!(
        "{}!{}{}:{}{}",
        quote_sheet(sheet),
        column_letter(start_col),
        start_row + 1,
        column_letter(end_col),
        end_row + 1
    )
}

/// Column span used as the append target (`'Data'!A:N`)
pub fn append_range(sheet: &str, width: usize) -> String {
    format!("{}!A:{}", quote_sheet(sheet), column_letter(width.max(1) - 1))
}

/// 0-based first row of a range such as `'Data'!A15:N15`
pub fn first_row_of_range(range: &str) -> Option<usize> {
    let cells = range.rsplit('!').next()?;
    let first = cells.split(':').next()?;
    let digits: String = first.chars().skip_while(|c| c.is_ascii_alphabetic()).collect();
    let row: usize = digits.parse().ok()?;
    row.checked_sub(1)
}
