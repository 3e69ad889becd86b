//! Group candidate rows by institution, then by program.
//!
//! ```text
//! rows                               groups
//! ┌──────────────────────┐          ┌───────────────────────────┐
//! │ 2: JKKN  BCA  BCA101 │          │ JKKN                      │
//! │ 3: JKKN  BSC  BSC201 │    →     │   BCA  rows [2, 4]        │
//! │ 4: jkkn  bca  BCA102 │          │   BSC  rows [3]           │
//! │ 5: DENT  BDS  BDS101 │          ├───────────────────────────┤
//! └──────────────────────┘          │ DENT                      │
//!                                   │   BDS  rows [5]           │
//!                                   └───────────────────────────┘
//! ```
//!
//! Keys compare case-insensitively; groups keep first-seen order so logs follow
//! the file.

use std::collections::HashMap;

use crate::models::MappingCandidate;

/// Rows of one program within an institution.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramGroup {
    /// Program code as first written in the file.
    pub program_code: String,
    /// Indices into the candidate slice.
    pub rows: Vec<usize>,
}

/// Rows of one institution.
#[derive(Debug, Clone, PartialEq)]
pub struct InstitutionGroup {
    pub institution_code: String,
    pub programs: Vec<ProgramGroup>,
}

impl InstitutionGroup {
    pub fn row_count(&self) -> usize {
        self.programs.iter().map(|p| p.rows.len()).sum()
    }

    pub fn rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.programs.iter().flat_map(|p| p.rows.iter().copied())
    }
}

/// Group the candidates at `indices`.
pub fn group_rows(candidates: &[MappingCandidate], indices: &[usize]) -> Vec<InstitutionGroup> {
    let mut groups: Vec<InstitutionGroup> = Vec::new();
    let mut by_institution: HashMap<String, usize> = HashMap::new();
    let mut by_program: HashMap<(usize, String), usize> = HashMap::new();

    for &index in indices {
        let codes = &candidates[index].codes;

        let inst_key = codes.institution_code.to_uppercase();
        let gi = *by_institution.entry(inst_key).or_insert_with(|| {
            groups.push(InstitutionGroup {
                institution_code: codes.institution_code.clone(),
                programs: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[gi];
        let pi = *by_program
            .entry((gi, codes.program_code.to_uppercase()))
            .or_insert_with(|| {
                group.programs.push(ProgramGroup {
                    program_code: codes.program_code.clone(),
                    rows: Vec::new(),
                });
                group.programs.len() - 1
            });

        group.programs[pi].rows.push(index);
    }

    groups
}
