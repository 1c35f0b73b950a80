//! The 256-entry slider table.

use ostinato_lang::SliderDecl;
use ostinato_vm::VarId;

use crate::curve::SliderCurve;

pub const MAX_SLIDERS: usize = 256;

/// One slider slot: parse-time metadata plus its VM binding.
#[derive(Debug, Clone, Default)]
pub struct Slider {
    pub decl: SliderDecl,
    pub curve: SliderCurve,
    pub(crate) var: Option<VarId>,
}

impl Slider {
    pub fn from_decl(decl: SliderDecl) -> Slider {
        let curve = SliderCurve {
            def: decl.def,
            min: decl.min,
            max: decl.max,
            inc: decl.inc,
            shape: decl.shape,
            modifier: decl.shape_modifier,
        };
        Slider {
            decl,
            curve,
            var: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.decl.exists
    }
}

/// Build the full table from the declarations of a header; undeclared
/// slots stay `exists == false`.
pub(crate) fn build_table(decls: &[SliderDecl]) -> Vec<Slider> {
    let mut table: Vec<Slider> = (0..MAX_SLIDERS as u32)
        .map(|id| {
            Slider::from_decl(SliderDecl {
                id,
                var: format!("slider{}", id + 1),
                ..SliderDecl::default()
            })
        })
        .collect();
    for decl in decls {
        if decl.exists && (decl.id as usize) < MAX_SLIDERS {
            table[decl.id as usize] = Slider::from_decl(decl.clone());
        }
    }
    table
}
