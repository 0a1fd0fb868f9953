//! Asignación local de registros.
//!
//! La asignación opera bloque básico por bloque básico sobre la
//! lista de instrucciones ya seleccionadas, reescribiendo los
//! registros virtuales de cada parámetro a registros físicos. Los
//! registros hogar de variables ("globales") viven en la pila a
//! desplazamientos estables: la primera lectura en un bloque los
//! carga y el cierre del bloque reescribe los modificados. Los
//! temporales no sobreviven al bloque donde nacen.
//!
//! Cuando los [`ALLOC_COUNT`] registros físicos están ocupados, se
//! desaloja una víctima escribiéndola a su ranura de pila. La
//! elección de víctima es determinista: el menor registro virtual
//! del mapa vigente.

use std::collections::{BTreeMap, VecDeque};

use super::select::{Inst, Kind, Param};
use crate::quad::ALLOC_COUNT;

/// Mapa de registros virtuales a desplazamientos de pila.
///
/// Las ranuras son de 4 bytes y crecen hacia abajo desde `SP`. La
/// frontera marcada por [`StackMapper::mark_global`] separa el área
/// de salvado de globales (arriba) de los temporales (abajo); el
/// rebobinado entre bloques descarta únicamente estos últimos.
pub struct StackMapper {
    offset: i32,
    global: i32,
    offsets: BTreeMap<u32, i32>,
}

impl StackMapper {
    pub fn new() -> Self {
        StackMapper {
            offset: 0,
            global: 0,
            offsets: BTreeMap::new(),
        }
    }

    /// Asigna una ranura al registro.
    pub fn add(&mut self, reg: u32) {
        self.offset -= 4;
        self.offsets.insert(reg, self.offset);
    }

    /// Obtiene el desplazamiento del registro, asignando una ranura
    /// nueva si no tenía.
    pub fn offset_of(&mut self, reg: u32) -> i32 {
        if let Some(&offset) = self.offsets.get(&reg) {
            return offset;
        }

        self.offset -= 4;
        self.offsets.insert(reg, self.offset);
        self.offset
    }

    /// Marca la posición actual como el fin del área de salvado de
    /// variables globales.
    pub fn mark_global(&mut self) {
        self.global = self.offset;
    }

    /// Determina si el registro es el hogar de una variable global.
    pub fn is_global(&self, reg: u32) -> bool {
        match self.offsets.get(&reg) {
            Some(&offset) => offset >= self.global,
            None => false,
        }
    }

    /// Descarta las ranuras de temporales, conservando solo el área
    /// global, y retrocede el desplazamiento a la frontera.
    pub fn rewind(&mut self) {
        self.offset = self.global;
        let global = self.global;
        self.offsets.retain(|_, &mut offset| offset >= global);
    }
}

impl Default for StackMapper {
    fn default() -> Self {
        StackMapper::new()
    }
}

/// Asignador de registros de un bloque básico.
pub struct RegAlloc<'a> {
    /// Registro virtual → registro físico.
    map: BTreeMap<u32, u32>,
    /// Registros físicos libres.
    avail: VecDeque<u32>,
    /// Globales escritos en el bloque, pendientes de reescritura.
    written: Vec<u32>,
    /// Físicos por liberar al terminar la instrucción en curso.
    fried: Vec<u32>,
    mapper: &'a mut StackMapper,
    insts: &'a mut Vec<Inst>,
}

impl<'a> RegAlloc<'a> {
    pub fn new(mapper: &'a mut StackMapper, insts: &'a mut Vec<Inst>) -> Self {
        RegAlloc {
            map: BTreeMap::new(),
            avail: (0..ALLOC_COUNT).collect(),
            written: Vec::new(),
            fried: Vec::new(),
            mapper,
            insts,
        }
    }

    /// Devuelve las instrucciones emitidas hasta el momento.
    pub fn insts(&self) -> &[Inst] {
        self.insts
    }

    /// Asigna los parámetros de una instrucción y la agrega a la
    /// lista de salida.
    pub fn process(&mut self, mut inst: Inst) {
        for index in 0..4 {
            match inst.param(index).kind() {
                Kind::Read => {
                    let rewritten = self.process_read(*inst.param(index));
                    *inst.param_mut(index) = rewritten;
                }

                Kind::Write => {
                    let rewritten = self.process_write(*inst.param(index));
                    *inst.param_mut(index) = rewritten;
                }

                Kind::Cst | Kind::None => (),
            }
        }

        self.insts.push(inst);

        for reg in self.fried.drain(..) {
            self.avail.push_back(reg);
        }
    }

    /// Cierra el bloque: reescribe a pila todos los globales
    /// modificados que aún viven en registros.
    pub fn complete(&mut self) {
        let written = std::mem::take(&mut self.written);
        for reg in written {
            // Un global desalojado ya fue escrito en su momento
            if let Some(&phys) = self.map.get(&reg) {
                self.store(reg, phys);
            }
        }
    }

    /// Cierra el bloque actual y reinicia el estado para el
    /// siguiente, agregando de por medio la instrucción frontera.
    pub fn boundary(&mut self, inst: Inst) {
        self.complete();
        self.insts.push(inst);

        self.map.clear();
        self.avail = (0..ALLOC_COUNT).collect();
        self.written.clear();
        self.mapper.rewind();
    }

    fn process_read(&mut self, param: Param) -> Param {
        let virt = param.value() as u32;

        // Cargar solo en el primer uso dentro del bloque
        let already_mapped = self.map.contains_key(&virt);
        let phys = self.allocate(virt);

        if self.mapper.is_global(virt) && !already_mapped {
            self.load(virt, phys);
        }

        Param::read(phys as i32)
    }

    fn process_write(&mut self, param: Param) -> Param {
        let virt = param.value() as u32;
        let phys = self.allocate(virt);

        if self.mapper.is_global(virt) && !self.written.contains(&virt) {
            self.written.push(virt);
        }

        Param::write(phys as i32)
    }

    /// Obtiene un registro físico para el virtual, desalojando una
    /// víctima si no hay libres.
    fn allocate(&mut self, virt: u32) -> u32 {
        if let Some(&phys) = self.map.get(&virt) {
            return phys;
        }

        if self.avail.is_empty() {
            let victim = *self
                .map
                .keys()
                .next()
                .expect("register pressure with an empty map");
            self.spill(victim);
        }

        let phys = self.avail.pop_front().expect("no physical register free");
        self.map.insert(virt, phys);
        phys
    }

    /// Desaloja un registro virtual, escribiéndolo a su ranura.
    fn spill(&mut self, virt: u32) {
        let phys = self.map[&virt];
        self.store(virt, phys);
        self.avail.push_front(phys);
        self.map.remove(&virt);
    }

    fn store(&mut self, virt: u32, phys: u32) {
        let offset = self.mapper.offset_of(virt);
        self.insts.push(Inst::new(
            "\tstr R%0, [SP, #%1]",
            &[Param::read(phys as i32), Param::cst(offset)],
        ));
    }

    fn load(&mut self, virt: u32, phys: u32) {
        let offset = self.mapper.offset_of(virt);
        self.insts.push(Inst::new(
            "\tldr R%0, [SP, #%1]",
            &[Param::write(phys as i32), Param::cst(offset)],
        ));
    }
}
