//! Popup-menu descriptor parser (the `gfx_showmenu` grammar).
//!
//! Items are `|`-separated. Prefixes: `>` opens a submenu titled by the
//! item, `<` marks the last entry of the current submenu, `#` disables,
//! `!` checks. An empty field is a separator.

/// Menu-building instruction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuOpcode {
    Item,
    Separator,
    Sub,
    EndSub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MenuItemFlags {
    pub disabled: bool,
    pub checked: bool,
}

/// One instruction of a parsed menu.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuInsn {
    pub opcode: MenuOpcode,
    /// Identifier of a selectable item, starting at 1; 0 otherwise.
    pub id: u32,
    pub name: String,
    pub flags: MenuItemFlags,
}

/// Parse a menu descriptor into its instruction list.
pub fn parse_menu(spec: &str) -> Vec<MenuInsn> {
    let mut insns = Vec::new();
    let mut depth = 0u32;
    let mut next_id = 1u32;

    for field in spec.split('|') {
        let mut rest = field;
        let mut flags = MenuItemFlags::default();
        let mut opens_sub = false;
        let mut closes_sub = false;

        loop {
            if let Some(r) = rest.strip_prefix('>') {
                opens_sub = true;
                rest = r;
            } else if let Some(r) = rest.strip_prefix('<') {
                closes_sub = true;
                rest = r;
            } else if let Some(r) = rest.strip_prefix('#') {
                flags.disabled = true;
                rest = r;
            } else if let Some(r) = rest.strip_prefix('!') {
                flags.checked = true;
                rest = r;
            } else {
                break;
            }
        }

        if rest.is_empty() && !opens_sub && !closes_sub {
            insns.push(MenuInsn {
                opcode: MenuOpcode::Separator,
                id: 0,
                name: String::new(),
                flags: MenuItemFlags::default(),
            });
            continue;
        }

        if opens_sub {
            depth += 1;
            insns.push(MenuInsn {
                opcode: MenuOpcode::Sub,
                id: 0,
                name: rest.to_string(),
                flags,
            });
            continue;
        }

        insns.push(MenuInsn {
            opcode: MenuOpcode::Item,
            id: next_id,
            name: rest.to_string(),
            flags,
        });
        next_id += 1;

        if closes_sub && depth > 0 {
            depth -= 1;
            insns.push(MenuInsn {
                opcode: MenuOpcode::EndSub,
                id: 0,
                name: String::new(),
                flags: MenuItemFlags::default(),
            });
        }
    }

    // unterminated submenus close at the end
    for _ in 0..depth {
        insns.push(MenuInsn {
            opcode: MenuOpcode::EndSub,
            id: 0,
            name: String::new(),
            flags: MenuItemFlags::default(),
        });
    }

    insns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(spec: &str) -> Vec<(MenuOpcode, u32, String)> {
        parse_menu(spec)
            .into_iter()
            .map(|i| (i.opcode, i.id, i.name))
            .collect()
    }

    #[test]
    fn test_flat_items_get_sequential_ids() {
        assert_eq!(
            ops("copy|paste|delete"),
            vec![
                (MenuOpcode::Item, 1, "copy".into()),
                (MenuOpcode::Item, 2, "paste".into()),
                (MenuOpcode::Item, 3, "delete".into()),
            ]
        );
    }

    #[test]
    fn test_separator() {
        let insns = parse_menu("a||b");
        assert_eq!(insns[1].opcode, MenuOpcode::Separator);
        assert_eq!(insns[2].id, 2);
    }

    #[test]
    fn test_submenu_nesting() {
        assert_eq!(
            ops("top|>sub|one|<two|after"),
            vec![
                (MenuOpcode::Item, 1, "top".into()),
                (MenuOpcode::Sub, 0, "sub".into()),
                (MenuOpcode::Item, 2, "one".into()),
                (MenuOpcode::Item, 3, "two".into()),
                (MenuOpcode::EndSub, 0, "".into()),
                (MenuOpcode::Item, 4, "after".into()),
            ]
        );
    }

    #[test]
    fn test_unterminated_submenu_closes() {
        let insns = parse_menu(">sub|one");
        assert_eq!(insns.last().unwrap().opcode, MenuOpcode::EndSub);
    }

    #[test]
    fn test_item_flags() {
        let insns = parse_menu("#grayed|!checked|#!both");
        assert!(insns[0].flags.disabled && !insns[0].flags.checked);
        assert!(insns[1].flags.checked && !insns[1].flags.disabled);
        assert!(insns[2].flags.disabled && insns[2].flags.checked);
        // flags do not consume ids
        assert_eq!(insns[2].id, 3);
    }
}
