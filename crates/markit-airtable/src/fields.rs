//! Airtable field identifiers written by the brief pipeline.

/// Field ids (or names) for every column Markit reads or writes. Airtable
/// accepts either in record payloads; formulas need names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    /// Field name of the identity column, used in `filterByFormula`.
    pub identity_name: String,
    /// Field id of the identity column, used for writes and as the formula
    /// fallback.
    pub identity_id: String,
    /// Serialized brief JSON (or raw text).
    pub full_response: String,
    /// Name of the full-response column, checked when reading records back.
    pub full_response_name: String,
    pub business_name: String,
    pub one_liner: String,
    pub icp: String,
    /// Comma-joined topic keywords.
    pub keywords: String,
    /// Serialized fan-out aggregate.
    pub orchestration: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            identity_name: "Email".to_string(),
            identity_id: "fldXhVuckpHBhWJOX".to_string(),
            full_response: "fldNLJlEqVwvOg100".to_string(),
            full_response_name: "Full Response".to_string(),
            business_name: "fldsrAZbfzPGLP6F8".to_string(),
            one_liner: "fldkI28kyg7gaiz2g".to_string(),
            icp: "flda7vhrHp4CuyxdC".to_string(),
            keywords: "fldwRfzjs6xt5Vqit".to_string(),
            orchestration: "Orchestration".to_string(),
        }
    }
}

impl FieldMap {
    /// Formulas tried in order when looking a record up by identity.
    #[must_use]
    pub fn identity_formulas(&self, identity: &str) -> Vec<String> {
        let value = escape_formula_string(&identity.trim().to_lowercase());
        vec![
            format!("LOWER({{{}}})='{value}'", self.identity_name),
            format!("LOWER({{{}}})='{value}'", self.identity_id),
        ]
    }
}

fn escape_formula_string(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formulas_try_name_then_id() {
        let formulas = FieldMap::default().identity_formulas("Founder@Acme.io");
        assert_eq!(
            formulas,
            vec![
                "LOWER({Email})='founder@acme.io'".to_string(),
                "LOWER({fldXhVuckpHBhWJOX})='founder@acme.io'".to_string(),
            ]
        );
    }

    #[test]
    fn formulas_escape_quotes() {
        let formulas = FieldMap::default().identity_formulas("o'brien@acme.io");
        assert_eq!(formulas[0], "LOWER({Email})='o\\'brien@acme.io'");
    }
}
